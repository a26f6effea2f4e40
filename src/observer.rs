use std::future::Future;

use crate::error::SidebarError;
use crate::markup::QuestionMarkup;

/// Controls of a question the observer reports activations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Check,
    Next,
    Hint,
    /// An entry of the widget's question review list, which jumps to
    /// another question.
    Review,
}

/// Raw structural change reported by the browser's mutation watcher, already
/// resolved to the question wrapper it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChange {
    /// Question wrappers that are, or are contained in, an inserted subtree.
    Inserted(Vec<QuestionMarkup>),
    /// A `class` or `style` attribute changed on or inside a question wrapper.
    AttributeChanged {
        question: QuestionMarkup,
        attribute: String,
    },
}

/// Normalized events derived from [`DomChange`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    QuestionsDiscovered(Vec<QuestionMarkup>),
    /// Visibility of a question wrapper changed; the active question may differ.
    QuestionChanged(QuestionMarkup),
    AnswerFeedback {
        question: QuestionMarkup,
        correct: bool,
    },
    ControlActivated {
        kind: ControlKind,
        question: QuestionMarkup,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Attached,
    AlreadyAttached,
}

type DiscoveryListener = Box<dyn FnMut(&[QuestionMarkup])>;
type QuestionListener = Box<dyn FnMut(&QuestionMarkup)>;
type FeedbackListener = Box<dyn FnMut(&QuestionMarkup, bool)>;

/// Turns the host widget's DOM churn into [`ObserverEvent`]s.
///
/// `C` is whatever identifies a watched container (a DOM element in the
/// browser, a plain value in tests). Delivery is synchronous, in the order
/// the changes were handed in.
pub struct DomObserver<C> {
    containers: Vec<C>,
    on_discovered: Vec<DiscoveryListener>,
    on_question_changed: Vec<QuestionListener>,
    on_feedback: Vec<FeedbackListener>,
    on_control: Vec<(ControlKind, QuestionListener)>,
}

impl<C: PartialEq> Default for DomObserver<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PartialEq> DomObserver<C> {
    pub fn new() -> Self {
        Self {
            containers: Vec::new(),
            on_discovered: Vec::new(),
            on_question_changed: Vec::new(),
            on_feedback: Vec::new(),
            on_control: Vec::new(),
        }
    }

    /// Starts watching `container`. A second call for the same container is a no-op.
    pub fn attach(&mut self, container: C) -> Attachment {
        if self.containers.contains(&container) {
            return Attachment::AlreadyAttached;
        }

        self.containers.push(container);
        Attachment::Attached
    }

    pub fn is_attached(&self, container: &C) -> bool {
        self.containers.contains(container)
    }

    pub fn on_questions_discovered(&mut self, handler: impl FnMut(&[QuestionMarkup]) + 'static) {
        self.on_discovered.push(Box::new(handler));
    }

    pub fn on_question_changed(&mut self, handler: impl FnMut(&QuestionMarkup) + 'static) {
        self.on_question_changed.push(Box::new(handler));
    }

    pub fn on_answer_feedback(&mut self, handler: impl FnMut(&QuestionMarkup, bool) + 'static) {
        self.on_feedback.push(Box::new(handler));
    }

    pub fn on_control_activated(
        &mut self,
        handler: impl FnMut(&QuestionMarkup) + 'static,
        kind: ControlKind,
    ) {
        self.on_control.push((kind, Box::new(handler)));
    }

    /// Normalizes `changes` and delivers the resulting events to listeners.
    ///
    /// The events are also returned, in delivery order, for callers that
    /// must act on them before the current browser task ends, such as
    /// cancelling the click being handled. Listeners cannot report back.
    pub fn dispatch(&mut self, changes: Vec<DomChange>) -> Vec<ObserverEvent> {
        let events = normalize(changes);
        for event in &events {
            self.deliver(event);
        }
        events
    }

    /// Reports a click on one of the question's controls.
    pub fn control_activated(&mut self, kind: ControlKind, question: QuestionMarkup) -> ObserverEvent {
        let event = ObserverEvent::ControlActivated { kind, question };
        self.deliver(&event);
        event
    }

    fn deliver(&mut self, event: &ObserverEvent) {
        match event {
            ObserverEvent::QuestionsDiscovered(questions) => {
                for handler in &mut self.on_discovered {
                    handler(questions);
                }
            }
            ObserverEvent::QuestionChanged(question) => {
                for handler in &mut self.on_question_changed {
                    handler(question);
                }
            }
            ObserverEvent::AnswerFeedback { question, correct } => {
                for handler in &mut self.on_feedback {
                    handler(question, *correct);
                }
            }
            ObserverEvent::ControlActivated { kind, question } => {
                for (listening, handler) in &mut self.on_control {
                    if listening == kind {
                        handler(question);
                    }
                }
            }
        }
    }
}

/// Maps raw changes to events, preserving order.
pub fn normalize(changes: Vec<DomChange>) -> Vec<ObserverEvent> {
    let mut events = Vec::new();

    for change in changes {
        match change {
            DomChange::Inserted(questions) if questions.is_empty() => {}
            DomChange::Inserted(questions) => {
                events.push(ObserverEvent::QuestionsDiscovered(questions));
            }
            DomChange::AttributeChanged {
                question,
                attribute,
            } => {
                if let Some(correct) = question.graded_outcome() {
                    events.push(ObserverEvent::AnswerFeedback {
                        question: question.clone(),
                        correct,
                    });
                }

                if attribute == "style" {
                    events.push(ObserverEvent::QuestionChanged(question));
                }
            }
        }
    }

    events
}

/// Cadence of [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollConfig {
    pub interval_ms: u32,
    pub timeout_ms: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_ms: 3000,
        }
    }
}

impl PollConfig {
    pub fn max_attempts(&self) -> u32 {
        (self.timeout_ms / self.interval_ms.max(1)).max(1)
    }
}

/// The awaited state never appeared. Carries the last probed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout<S> {
    pub attempts: u32,
    pub waited_ms: u32,
    pub last: S,
}

impl<S> From<PollTimeout<S>> for SidebarError {
    fn from(timeout: PollTimeout<S>) -> Self {
        SidebarError::PollTimeout {
            attempts: timeout.attempts,
            waited_ms: timeout.waited_ms,
        }
    }
}

/// Probes until `predicate` accepts a state or the attempts run out.
///
/// Each attempt first waits one interval through `sleep`, giving the host
/// widget a chance to finish its asynchronous class updates, then probes.
///
/// # Errors
/// Returns [`PollTimeout`] with the last probed state after
/// [`PollConfig::max_attempts`] rejected probes.
pub async fn poll_until<S, Probe, Pred, Sleep, Delay>(
    config: PollConfig,
    mut probe: Probe,
    mut predicate: Pred,
    mut sleep: Sleep,
) -> Result<S, PollTimeout<S>>
where
    Probe: FnMut() -> S,
    Pred: FnMut(&S) -> bool,
    Sleep: FnMut(u32) -> Delay,
    Delay: Future<Output = ()>,
{
    let max_attempts = config.max_attempts();
    let mut attempts = 0;

    loop {
        sleep(config.interval_ms).await;
        attempts += 1;

        let state = probe();
        if predicate(&state) {
            return Ok(state);
        }

        if attempts >= max_attempts {
            return Err(PollTimeout {
                attempts,
                waited_ms: attempts.saturating_mul(config.interval_ms),
                last: state,
            });
        }
    }
}
