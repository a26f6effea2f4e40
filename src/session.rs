use crate::config::SidebarConfig;
use crate::error::SidebarError;
use crate::markup::QuestionMarkup;
use crate::media::{LookupRequest, MediaClient, MediaDescriptor, MediaKey, MediaResolution};
use crate::observer::{ControlKind, ObserverEvent};
use crate::policy::{HintPolicy, ProceedDecision, UiEffect};
use crate::sidebar::{Sidebar, SidebarView};
use crate::tracker::{QuestionId, QuestionTracker, Selection};

/// Work the browser layer has to carry out after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ui {
        question: QuestionId,
        effect: UiEffect,
    },
    /// Cancel the navigation click that is being handled.
    BlockProceed(QuestionId),
    Lookup(LookupRequest),
    /// Poll the question's markup for the widget's grading.
    WatchOutcome(QuestionId),
    Render(SidebarView),
}

fn ui(question: &QuestionId, effects: Vec<UiEffect>) -> Vec<Command> {
    effects
        .into_iter()
        .map(|effect| Command::Ui {
            question: question.clone(),
            effect,
        })
        .collect()
}

/// Everything one quiz page needs, owned in one place.
///
/// Events are applied strictly in the order they are handed in.
#[derive(Debug)]
pub struct QuizSession {
    config: SidebarConfig,
    tracker: QuestionTracker,
    policy: HintPolicy,
    media: MediaClient,
    sidebar: Sidebar,
}

impl QuizSession {
    pub fn new(config: SidebarConfig) -> Self {
        Self {
            tracker: QuestionTracker::new(config.hint_requirement, config.enforce_hint),
            policy: HintPolicy::new(config.enforce_hint, config.hint_requirement),
            media: MediaClient::new(&config),
            sidebar: Sidebar::new(),
            config,
        }
    }

    pub fn config(&self) -> &SidebarConfig {
        &self.config
    }

    pub fn tracker(&self) -> &QuestionTracker {
        &self.tracker
    }

    pub fn policy(&self) -> &HintPolicy {
        &self.policy
    }

    pub fn sidebar(&self) -> &Sidebar {
        &self.sidebar
    }

    pub fn handle(&mut self, event: ObserverEvent) -> Vec<Command> {
        match event {
            ObserverEvent::QuestionsDiscovered(questions) => self.navigation_settled(&questions),
            ObserverEvent::QuestionChanged(question) => {
                let id = self.tracker.discover(&question).id;
                if question.visible {
                    self.activate(id)
                } else {
                    Vec::new()
                }
            }
            ObserverEvent::AnswerFeedback { question, correct } => {
                let id = self.tracker.discover(&question).id;
                self.outcome_observed(&id, correct)
            }
            ObserverEvent::ControlActivated { kind, question } => {
                let id = self.tracker.discover(&question).id;
                match kind {
                    ControlKind::Check => self.check_requested(&id),
                    ControlKind::Next | ControlKind::Review => self.proceed_requested(&id),
                    ControlKind::Hint => self.hint_activated(&id),
                }
            }
        }
    }

    pub fn discover(&mut self, question: &QuestionMarkup) -> QuestionId {
        self.tracker.discover(question).id
    }

    /// Rediscovers the given questions and follows the visible one.
    pub fn navigation_settled(&mut self, questions: &[QuestionMarkup]) -> Vec<Command> {
        for question in questions {
            self.tracker.discover(question);
        }

        match self.tracker.current_question_id(questions) {
            Some(id) => self.activate(id),
            None => Vec::new(),
        }
    }

    pub fn selection_changed(&mut self, id: &QuestionId, selection: Selection) -> Vec<Command> {
        let before = self.selection_of(id);
        let effects = self.policy.on_selection(&mut self.tracker, id, selection);
        let mut commands = ui(id, effects);

        let Some(after) = self.selection_of(id).filter(|after| Some(after) != before.as_ref())
        else {
            return commands;
        };

        self.tracker.set_active(Some(id.clone()));
        let answer = self
            .tracker
            .record(id)
            .and_then(|record| record.answer_key(before.as_ref(), &after));
        if let Some(answer) = answer {
            commands.extend(self.request_media(MediaKey::answer(id.clone(), answer)));
        }
        commands
    }

    pub fn check_requested(&mut self, id: &QuestionId) -> Vec<Command> {
        if self.tracker.record(id).is_none() {
            return Vec::new();
        }
        vec![Command::WatchOutcome(id.clone())]
    }

    pub fn outcome_observed(&mut self, id: &QuestionId, correct: bool) -> Vec<Command> {
        let effects = self.policy.on_outcome(&mut self.tracker, id, correct);
        ui(id, effects)
    }

    /// The widget never showed a grading. Nothing is locked on a guess.
    pub fn outcome_timed_out(&mut self, id: &QuestionId, error: SidebarError) -> Vec<Command> {
        tracing::warn!(question = %id, "{error}; leaving question ungated");
        Vec::new()
    }

    pub fn hint_activated(&mut self, id: &QuestionId) -> Vec<Command> {
        let effects = self.policy.on_hint(&mut self.tracker, id);
        ui(id, effects)
    }

    pub fn hint_closed(&mut self, id: &QuestionId) -> Vec<Command> {
        self.policy.on_hint_closed(id);
        Vec::new()
    }

    pub fn proceed_requested(&mut self, id: &QuestionId) -> Vec<Command> {
        let (decision, effects) = self.policy.on_proceed(&self.tracker, id);
        let mut commands = Vec::new();
        if decision == ProceedDecision::Suppress {
            commands.push(Command::BlockProceed(id.clone()));
        }
        commands.extend(ui(id, effects));
        commands
    }

    pub fn media_completed(
        &mut self,
        key: &MediaKey,
        result: Result<Option<MediaDescriptor>, SidebarError>,
    ) -> Vec<Command> {
        let question_image = self
            .tracker
            .record(&key.question)
            .and_then(|record| record.first_image.clone());
        let resolution =
            self.media
                .complete(key, result, self.tracker.active(), question_image.as_ref());

        match resolution {
            MediaResolution::Render { descriptor, source } => {
                tracing::debug!(key = %key, ?source, "showing media");
                vec![Command::Render(self.sidebar.show(&descriptor).clone())]
            }
            MediaResolution::Requery(request) => {
                vec![
                    Command::Render(self.sidebar.begin_loading().clone()),
                    Command::Lookup(request),
                ]
            }
            MediaResolution::Pending => Vec::new(),
            MediaResolution::Discarded(error) => {
                tracing::debug!("{error}; discarded");
                Vec::new()
            }
        }
    }

    pub fn image_failed(&mut self, src: &str) -> Vec<Command> {
        if self.sidebar.image_failed(src) {
            vec![Command::Render(self.sidebar.view().clone())]
        } else {
            Vec::new()
        }
    }

    fn selection_of(&self, id: &QuestionId) -> Option<Selection> {
        self.tracker
            .record(id)
            .and_then(|record| record.selection.clone())
    }

    fn activate(&mut self, id: QuestionId) -> Vec<Command> {
        if !self.tracker.set_active(Some(id.clone())) {
            return Vec::new();
        }
        tracing::debug!(question = %id, "active question changed");
        self.request_media(MediaKey::question(id))
    }

    fn request_media(&mut self, key: MediaKey) -> Vec<Command> {
        if !self.config.sidebar_enabled {
            return Vec::new();
        }

        match self.media.fetch(key) {
            Some(request) => vec![
                Command::Render(self.sidebar.begin_loading().clone()),
                Command::Lookup(request),
            ],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::AnswerMarkup;

    fn question(position: usize, id: &str) -> QuestionMarkup {
        let name = format!("question_1_{id}");
        QuestionMarkup::new(position)
            .with_answers(vec![
                AnswerMarkup::radio(&name, "10"),
                AnswerMarkup::radio(&name, "11").flagged_correct(),
            ])
            .with_hint("<p>Hint</p>")
    }

    fn session() -> QuizSession {
        QuizSession::new(SidebarConfig {
            enforce_hint: true,
            ..SidebarConfig::default()
        })
    }

    fn lookups(commands: &[Command]) -> Vec<&LookupRequest> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::Lookup(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn visible_question_triggers_one_lookup() {
        let mut session = session();
        let questions = vec![question(0, "5").visible(), question(1, "6")];

        let commands = session.navigation_settled(&questions);
        assert_eq!(commands.first(), Some(&Command::Render(SidebarView::Loading)));
        assert_eq!(lookups(&commands).len(), 1);
        assert_eq!(session.tracker().active(), Some(&QuestionId::from("5")));

        assert!(session.navigation_settled(&questions).is_empty());
    }

    #[test]
    fn selection_lookups_use_answer_values() {
        let mut session = session();
        session.navigation_settled(&[question(0, "5").visible()]);
        let id = QuestionId::from("5");

        let commands = session.selection_changed(&id, Selection::Single(1));
        let requests = lookups(&commands);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, MediaKey::answer(id.clone(), "11"));

        assert!(lookups(&session.selection_changed(&id, Selection::Single(1))).is_empty());
    }

    #[test]
    fn check_click_starts_watch() {
        let mut session = session();
        let markup = question(0, "5").visible();
        let commands = session.handle(ObserverEvent::ControlActivated {
            kind: ControlKind::Check,
            question: markup,
        });
        assert_eq!(commands, vec![Command::WatchOutcome(QuestionId::from("5"))]);
    }

    #[test]
    fn blocked_proceed_is_reported() {
        let mut session = session();
        session.navigation_settled(&[question(0, "5").visible()]);
        let id = QuestionId::from("5");
        session.selection_changed(&id, Selection::Single(0));
        session.outcome_observed(&id, false);

        let commands = session.proceed_requested(&id);
        assert_eq!(commands.first(), Some(&Command::BlockProceed(id.clone())));

        session.hint_activated(&id);
        assert!(session.proceed_requested(&id).is_empty());
    }

    #[test]
    fn timeout_never_blocks() {
        let mut session = session();
        session.navigation_settled(&[question(0, "5").visible()]);
        let id = QuestionId::from("5");
        session.selection_changed(&id, Selection::Single(0));

        let commands = session.outcome_timed_out(
            &id,
            SidebarError::PollTimeout {
                attempts: 30,
                waited_ms: 3000,
            },
        );
        assert!(commands.is_empty());
        assert!(session.proceed_requested(&id).is_empty());
    }

    #[test]
    fn disabled_sidebar_sends_no_lookups() {
        let mut session = QuizSession::new(SidebarConfig {
            sidebar_enabled: false,
            ..SidebarConfig::default()
        });
        let commands = session.navigation_settled(&[question(0, "5").visible()]);
        assert!(commands.is_empty());
        assert_eq!(session.tracker().active(), Some(&QuestionId::from("5")));
    }

    #[test]
    fn broken_image_shows_error() {
        let mut session = session();
        let commands = session.navigation_settled(&[question(0, "5").visible()]);
        let key = lookups(&commands)[0].key.clone();

        session.media_completed(&key, Ok(Some(MediaDescriptor::image("/x.png", None))));
        assert_eq!(
            session.image_failed("/x.png"),
            vec![Command::Render(SidebarView::Error)]
        );
        assert!(session.image_failed("/x.png").is_empty());
    }
}
