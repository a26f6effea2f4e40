use std::collections::HashMap;

use crate::tracker::{QuestionId, QuestionTracker, Selection, SelectionChange};

/// How strictly the hint is enforced after incorrect answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HintRequirement {
    /// Reselecting while locked unlocks without a hint, and a hint viewed
    /// once satisfies the question for good.
    #[default]
    Permissive,
    /// Reselecting while locked is blocked; every incorrect attempt needs the
    /// hint again.
    EveryAttempt,
}

/// Gate state of one question for the current attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Unanswered,
    Correct,
    IncorrectLocked,
    /// Hint opened from a locked state; the user is reading it.
    HintPending,
}

/// Named DOM operations the browser layer performs on a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEffect {
    ShowProceed,
    HideProceed,
    ShowCheck,
    /// Dims and locks the answers. With `allow_reselect` the inputs stay
    /// clickable so a new selection can unlock the question.
    LockInputs { allow_reselect: bool },
    UnlockInputs,
    ShowHintPrompt,
    HighlightHint,
    ClearHintPrompt,
    OpenHint,
    ClearSelection,
    HideFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedDecision {
    Allow,
    Suppress,
}

/// Gates the "next" control on having viewed the hint after a wrong answer.
///
/// Reads and mutates question state only through [`QuestionTracker`]. A
/// question without verified ground truth or without a hint is never locked,
/// so navigation there is left to the host widget.
#[derive(Debug)]
pub struct HintPolicy {
    enabled: bool,
    requirement: HintRequirement,
    states: HashMap<QuestionId, GateState>,
}

impl HintPolicy {
    pub fn new(enabled: bool, requirement: HintRequirement) -> Self {
        Self {
            enabled,
            requirement,
            states: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self, id: &QuestionId) -> GateState {
        self.states.get(id).copied().unwrap_or_default()
    }

    /// The widget graded an attempt.
    pub fn on_outcome(
        &mut self,
        tracker: &mut QuestionTracker,
        id: &QuestionId,
        is_correct: bool,
    ) -> Vec<UiEffect> {
        let previous = self.state(id);
        let Some(record) = tracker.apply_outcome(id, is_correct) else {
            return Vec::new();
        };

        if !self.enabled {
            return Vec::new();
        }

        if is_correct {
            if previous == GateState::Correct {
                return Vec::new();
            }
            self.states.insert(id.clone(), GateState::Correct);
            tracing::debug!(question = %id, "correct answer, proceeding allowed");
            return vec![UiEffect::ClearHintPrompt, UiEffect::ShowProceed];
        }

        if !record.locked {
            if !record.is_gated() {
                tracing::debug!(question = %id, "incorrect answer on ungated question");
            }
            self.states.insert(id.clone(), GateState::Unanswered);
            return Vec::new();
        }

        if previous == GateState::IncorrectLocked {
            return Vec::new();
        }

        self.states.insert(id.clone(), GateState::IncorrectLocked);
        tracing::info!(question = %id, "incorrect answer, hint required");
        vec![
            UiEffect::HideProceed,
            UiEffect::LockInputs {
                allow_reselect: self.requirement == HintRequirement::Permissive,
            },
            UiEffect::ShowHintPrompt,
            UiEffect::HighlightHint,
        ]
    }

    /// The user changed the selection of a question.
    pub fn on_selection(
        &mut self,
        tracker: &mut QuestionTracker,
        id: &QuestionId,
        selection: Selection,
    ) -> Vec<UiEffect> {
        match tracker.record_selection(id, selection) {
            SelectionChange::Changed => {}
            SelectionChange::Blocked => return vec![UiEffect::HighlightHint],
            SelectionChange::Unchanged | SelectionChange::UnknownQuestion => return Vec::new(),
        }

        match self.state(id) {
            GateState::IncorrectLocked => {
                tracker.release_lock(id);
                self.states.insert(id.clone(), GateState::Unanswered);
                tracing::debug!(question = %id, "reselected after incorrect answer, unlocked");
                vec![
                    UiEffect::UnlockInputs,
                    UiEffect::ClearHintPrompt,
                    UiEffect::HideFeedback,
                    UiEffect::ShowCheck,
                ]
            }
            GateState::HintPending => {
                self.states.insert(id.clone(), GateState::Unanswered);
                Vec::new()
            }
            GateState::Unanswered | GateState::Correct => Vec::new(),
        }
    }

    /// The hint control of a question was activated.
    pub fn on_hint(&mut self, tracker: &mut QuestionTracker, id: &QuestionId) -> Vec<UiEffect> {
        let was_locked = tracker.record(id).is_some_and(|record| record.locked);
        if tracker.mark_hint_viewed(id).is_none() || !self.enabled {
            return Vec::new();
        }

        if !was_locked && self.state(id) != GateState::IncorrectLocked {
            return vec![UiEffect::ClearHintPrompt];
        }

        tracker.clear_selection(id);
        self.states.insert(id.clone(), GateState::HintPending);
        tracing::debug!(question = %id, "hint viewed, question unlocked");
        vec![
            UiEffect::OpenHint,
            UiEffect::UnlockInputs,
            UiEffect::ClearSelection,
            UiEffect::ClearHintPrompt,
            UiEffect::HideFeedback,
            UiEffect::ShowCheck,
        ]
    }

    /// The hint display was dismissed.
    pub fn on_hint_closed(&mut self, id: &QuestionId) {
        if self.state(id) == GateState::HintPending {
            self.states.insert(id.clone(), GateState::Unanswered);
        }
    }

    /// The user tried to move past a question.
    pub fn on_proceed(
        &self,
        tracker: &QuestionTracker,
        id: &QuestionId,
    ) -> (ProceedDecision, Vec<UiEffect>) {
        let locked = tracker.record(id).is_some_and(|record| record.locked);

        if self.enabled && locked {
            tracing::info!(question = %id, "proceed suppressed until the hint is viewed");
            return (
                ProceedDecision::Suppress,
                vec![
                    UiEffect::HideProceed,
                    UiEffect::ShowHintPrompt,
                    UiEffect::HighlightHint,
                ],
            );
        }

        (ProceedDecision::Allow, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{AnswerMarkup, QuestionMarkup};

    fn question(correct_known: bool, with_hint: bool) -> QuestionMarkup {
        let answers = (0..3)
            .map(|index| {
                let answer = AnswerMarkup::radio("question_2_11", &(index + 1).to_string());
                if correct_known && index == 1 {
                    answer.flagged_correct()
                } else {
                    answer
                }
            })
            .collect();
        let markup = QuestionMarkup::new(0).visible().with_answers(answers);
        if with_hint {
            markup.with_hint("<p>Read chapter 2</p>")
        } else {
            markup
        }
    }

    fn setup(requirement: HintRequirement, markup: &QuestionMarkup) -> (QuestionTracker, HintPolicy, QuestionId) {
        let mut tracker = QuestionTracker::new(requirement, true);
        let id = tracker.discover(markup).id;
        (tracker, HintPolicy::new(true, requirement), id)
    }

    #[test]
    fn wrong_then_right_answer() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, true));

        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        let effects = policy.on_outcome(&mut tracker, &id, false);
        assert_eq!(policy.state(&id), GateState::IncorrectLocked);
        assert!(effects.contains(&UiEffect::HideProceed));
        assert!(effects.contains(&UiEffect::LockInputs { allow_reselect: true }));
        assert!(effects.contains(&UiEffect::ShowHintPrompt));

        let effects = policy.on_selection(&mut tracker, &id, Selection::Single(1));
        assert_eq!(policy.state(&id), GateState::Unanswered);
        assert!(effects.contains(&UiEffect::UnlockInputs));
        assert!(!tracker.record(&id).expect("known").locked);

        let effects = policy.on_outcome(&mut tracker, &id, true);
        assert_eq!(policy.state(&id), GateState::Correct);
        assert!(effects.contains(&UiEffect::ShowProceed));
    }

    #[test]
    fn hint_unlocks_and_clears_selection() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, true));

        policy.on_selection(&mut tracker, &id, Selection::Single(2));
        policy.on_outcome(&mut tracker, &id, false);
        let effects = policy.on_hint(&mut tracker, &id);

        assert_eq!(policy.state(&id), GateState::HintPending);
        assert_eq!(effects.first(), Some(&UiEffect::OpenHint));
        assert!(effects.contains(&UiEffect::ClearSelection));

        let record = tracker.record(&id).expect("known");
        assert!(record.hint_viewed);
        assert!(!record.locked);
        assert_eq!(record.selection, None);

        policy.on_hint_closed(&id);
        assert_eq!(policy.state(&id), GateState::Unanswered);
    }

    #[test]
    fn unknown_ground_truth_never_locks() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(false, true));

        for selection in [0, 1, 2] {
            policy.on_selection(&mut tracker, &id, Selection::Single(selection));
            let effects = policy.on_outcome(&mut tracker, &id, false);
            assert!(effects.is_empty());
            assert_ne!(policy.state(&id), GateState::IncorrectLocked);
        }

        let (decision, _) = policy.on_proceed(&tracker, &id);
        assert_eq!(decision, ProceedDecision::Allow);
    }

    #[test]
    fn question_without_hint_records_failure_only() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, false));

        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        let effects = policy.on_outcome(&mut tracker, &id, false);

        assert!(effects.is_empty());
        let record = tracker.record(&id).expect("known");
        assert!(record.was_incorrect);
        assert!(!record.locked);
    }

    #[test]
    fn proceed_is_suppressed_while_locked() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, true));
        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        policy.on_outcome(&mut tracker, &id, false);

        let (decision, effects) = policy.on_proceed(&tracker, &id);
        assert_eq!(decision, ProceedDecision::Suppress);
        assert!(effects.contains(&UiEffect::HighlightHint));

        policy.on_hint(&mut tracker, &id);
        let (decision, _) = policy.on_proceed(&tracker, &id);
        assert_eq!(decision, ProceedDecision::Allow);
    }

    #[test]
    fn repeated_feedback_is_idempotent() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, true));
        policy.on_selection(&mut tracker, &id, Selection::Single(0));

        assert!(!policy.on_outcome(&mut tracker, &id, false).is_empty());
        assert!(policy.on_outcome(&mut tracker, &id, false).is_empty());

        policy.on_selection(&mut tracker, &id, Selection::Single(1));
        assert!(!policy.on_outcome(&mut tracker, &id, true).is_empty());
        assert!(policy.on_outcome(&mut tracker, &id, true).is_empty());
    }

    #[test]
    fn same_selection_does_not_unlock() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::Permissive, &question(true, true));
        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        policy.on_outcome(&mut tracker, &id, false);

        assert!(policy.on_selection(&mut tracker, &id, Selection::Single(0)).is_empty());
        assert_eq!(policy.state(&id), GateState::IncorrectLocked);
    }

    #[test]
    fn every_attempt_blocks_reselection_until_hint() {
        let (mut tracker, mut policy, id) = setup(HintRequirement::EveryAttempt, &question(true, true));
        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        let effects = policy.on_outcome(&mut tracker, &id, false);
        assert!(effects.contains(&UiEffect::LockInputs { allow_reselect: false }));

        let effects = policy.on_selection(&mut tracker, &id, Selection::Single(1));
        assert_eq!(effects, vec![UiEffect::HighlightHint]);
        assert_eq!(policy.state(&id), GateState::IncorrectLocked);

        policy.on_hint(&mut tracker, &id);
        policy.on_hint_closed(&id);
        policy.on_selection(&mut tracker, &id, Selection::Single(2));
        policy.on_outcome(&mut tracker, &id, false);
        assert_eq!(policy.state(&id), GateState::IncorrectLocked);
    }

    #[test]
    fn disabled_policy_only_records() {
        let markup = question(true, true);
        let mut tracker = QuestionTracker::new(HintRequirement::Permissive, false);
        let id = tracker.discover(&markup).id;
        let mut policy = HintPolicy::new(false, HintRequirement::Permissive);

        policy.on_selection(&mut tracker, &id, Selection::Single(0));
        assert!(policy.on_outcome(&mut tracker, &id, false).is_empty());
        assert!(tracker.record(&id).expect("known").was_incorrect);
        assert_eq!(policy.on_proceed(&tracker, &id).0, ProceedDecision::Allow);
        assert!(policy.on_hint(&mut tracker, &id).is_empty());
    }

    #[test]
    fn hint_requirement_serializes_in_camel_case() {
        let parsed: HintRequirement =
            serde_json::from_str("\"everyAttempt\"").expect("variant should parse");
        assert_eq!(parsed, HintRequirement::EveryAttempt);
    }
}
