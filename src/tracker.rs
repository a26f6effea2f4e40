use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::SidebarError;
use crate::markup::{Feedback, ImageRef, InputKind, QuestionMarkup};
use crate::policy::HintRequirement;

/// Stable identifier of a quiz question.
///
/// Either the server-assigned numeric id read from the markup or a
/// positional synthetic id of the form `q<position + 1>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn synthetic(position: usize) -> Self {
        Self(format!("q{}", position + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Zero-based position encoded in a synthetic id.
    pub fn synthetic_index(&self) -> Option<usize> {
        let digits = self.0.strip_prefix('q')?;
        let number: usize = digits.parse().ok()?;
        number.checked_sub(1)
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic_index().is_some()
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Single,
    Multiple,
    Cloze,
    MatrixSort,
    Unknown,
}

impl QuestionType {
    fn infer(markup: &QuestionMarkup) -> Self {
        if markup.has_input(InputKind::Radio) {
            Self::Single
        } else if markup.has_input(InputKind::Checkbox) {
            Self::Multiple
        } else if markup.has_cloze {
            Self::Cloze
        } else if markup.has_matrix_sort {
            Self::MatrixSort
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectAnswer {
    Single(usize),
    Multiple(BTreeSet<usize>),
}

/// What the user currently has selected for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Single(usize),
    Multiple(BTreeSet<usize>),
    /// Free-form answers (cloze blanks, dropdown values).
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Changed,
    Unchanged,
    /// The question is locked and the hint requirement forbids reselecting.
    Blocked,
    UnknownQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub position: usize,
    pub question_type: QuestionType,
    pub correct_answer: Option<CorrectAnswer>,
    pub correct_answer_found: bool,
    pub selection: Option<Selection>,
    pub has_hint: bool,
    pub hint_viewed: bool,
    pub locked: bool,
    pub was_incorrect: bool,
    pub hint_html: Option<String>,
    pub first_image: Option<ImageRef>,
    answer_values: Vec<Option<String>>,
    has_select: bool,
}

impl QuestionRecord {
    fn new(id: QuestionId, markup: &QuestionMarkup) -> Self {
        Self {
            id,
            position: markup.position,
            question_type: QuestionType::Unknown,
            correct_answer: None,
            correct_answer_found: false,
            selection: None,
            has_hint: markup.has_hint_control,
            hint_viewed: false,
            locked: false,
            was_incorrect: false,
            hint_html: None,
            first_image: None,
            answer_values: Vec::new(),
            has_select: false,
        }
    }

    /// Whether an incorrect answer here can be gated behind the hint.
    /// Without verified ground truth or a hint to show, it never is.
    pub fn is_gated(&self) -> bool {
        self.correct_answer_found && self.has_hint
    }

    /// Key used for answer-specific media lookups.
    ///
    /// Choice answers use the input's `value`, else the one-based position.
    /// For checkboxes that is the option checked by this change; unchecking
    /// alone yields nothing. Dropdown questions use the selected value.
    pub fn answer_key(&self, previous: Option<&Selection>, selection: &Selection) -> Option<String> {
        match selection {
            Selection::Single(index) => Some(self.choice_key(*index)),
            Selection::Multiple(checked) => {
                let before = match previous {
                    Some(Selection::Multiple(before)) => before.clone(),
                    _ => BTreeSet::new(),
                };
                checked
                    .difference(&before)
                    .last()
                    .map(|index| self.choice_key(*index))
            }
            Selection::Text(value) if self.has_select => Some(value.clone()),
            Selection::Text(_) => None,
        }
    }

    fn choice_key(&self, index: usize) -> String {
        self.answer_values
            .get(index)
            .cloned()
            .flatten()
            .unwrap_or_else(|| (index + 1).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub id: QuestionId,
    pub is_new: bool,
    /// Set when the markup did not reveal the correct answer.
    pub ambiguity: Option<SidebarError>,
}

/// Sole owner and writer of [`QuestionRecord`]s.
#[derive(Debug)]
pub struct QuestionTracker {
    records: HashMap<QuestionId, QuestionRecord>,
    positions: HashMap<usize, QuestionId>,
    active: Option<QuestionId>,
    requirement: HintRequirement,
    enforcement: bool,
}

impl QuestionTracker {
    pub fn new(requirement: HintRequirement, enforcement: bool) -> Self {
        Self {
            records: HashMap::new(),
            positions: HashMap::new(),
            active: None,
            requirement,
            enforcement,
        }
    }

    pub fn record(&self, id: &QuestionId) -> Option<&QuestionRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active(&self) -> Option<&QuestionId> {
        self.active.as_ref()
    }

    /// Returns `true` when the active question actually changed.
    pub fn set_active(&mut self, id: Option<QuestionId>) -> bool {
        if self.active == id {
            return false;
        }
        self.active = id;
        true
    }

    /// Scans a question's markup into its record, creating it on first sight.
    ///
    /// Repeated discovery of the same question updates the markup-derived
    /// fields but never resets selection, lock or hint state. Never fails:
    /// markup that does not reveal the correct answer leaves the question
    /// ungated.
    pub fn discover(&mut self, markup: &QuestionMarkup) -> Discovery {
        let id = resolve_id(markup);
        self.rekey_position(markup.position, &id);

        let is_new = !self.records.contains_key(&id);
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| QuestionRecord::new(id.clone(), markup));
        self.positions.insert(markup.position, id.clone());

        record.position = markup.position;
        record.question_type = QuestionType::infer(markup);
        record.answer_values = markup
            .answers
            .iter()
            .map(|answer| answer.value.clone())
            .collect();
        record.has_select = markup.has_input(InputKind::Select);
        record.hint_html = markup.hint_html.clone().or(record.hint_html.take());
        record.first_image = markup.first_image.clone().or(record.first_image.take());

        if !record.correct_answer_found {
            if let Some(answer) = discover_correct_answer(record.question_type, markup) {
                record.correct_answer = Some(answer);
                record.correct_answer_found = true;
            }
        }

        let ambiguity = (!record.correct_answer_found).then(|| SidebarError::DiscoveryAmbiguous {
            question: id.clone(),
            reason: format!("{:?} question without correctness markers", record.question_type),
        });

        if let Some(error) = &ambiguity {
            tracing::debug!(question = %id, "{error}; leaving ungated");
        } else if is_new {
            tracing::debug!(question = %id, kind = ?record.question_type, "question discovered");
        }

        Discovery {
            id,
            is_new,
            ambiguity,
        }
    }

    /// Resolves the question the user is looking at.
    ///
    /// Falls back from id metadata on the visible question, to the id in an
    /// input name, to the positional synthetic id. `None` when no question
    /// is visible.
    pub fn current_question_id(&self, questions: &[QuestionMarkup]) -> Option<QuestionId> {
        questions
            .iter()
            .find(|question| question.visible)
            .map(resolve_id)
    }

    pub fn record_selection(&mut self, id: &QuestionId, selection: Selection) -> SelectionChange {
        let requirement = self.requirement;
        let Some(record) = self.records.get_mut(id) else {
            return SelectionChange::UnknownQuestion;
        };

        if record.locked && requirement == HintRequirement::EveryAttempt {
            return SelectionChange::Blocked;
        }

        if record.selection.as_ref() == Some(&selection) {
            return SelectionChange::Unchanged;
        }

        record.selection = Some(selection);
        SelectionChange::Changed
    }

    pub fn clear_selection(&mut self, id: &QuestionId) {
        if let Some(record) = self.records.get_mut(id) {
            record.selection = None;
        }
    }

    /// Records the widget's grading of an attempt.
    ///
    /// An incorrect attempt always sets `was_incorrect`; it locks only when
    /// enforcement is on, the question is gated and the hint still has to be
    /// viewed. A correct attempt clears the lock.
    pub fn apply_outcome(&mut self, id: &QuestionId, is_correct: bool) -> Option<&QuestionRecord> {
        let requirement = self.requirement;
        let enforcement = self.enforcement;
        let Some(record) = self.records.get_mut(id) else {
            tracing::warn!(question = %id, "outcome for an undiscovered question ignored");
            return None;
        };

        if is_correct {
            record.locked = false;
        } else {
            record.was_incorrect = true;

            if enforcement && record.is_gated() {
                if requirement == HintRequirement::EveryAttempt {
                    record.hint_viewed = false;
                }
                record.locked = !record.hint_viewed;
            }
        }

        Some(&*record)
    }

    /// Unlocks a question after a reselection, without a hint.
    pub fn release_lock(&mut self, id: &QuestionId) -> bool {
        match self.records.get_mut(id) {
            Some(record) if record.locked => {
                record.locked = false;
                true
            }
            _ => false,
        }
    }

    pub fn mark_hint_viewed(&mut self, id: &QuestionId) -> Option<&QuestionRecord> {
        let record = self.records.get_mut(id)?;
        record.hint_viewed = true;
        record.locked = false;
        Some(&*record)
    }

    /// A question first seen under its synthetic id keeps its state when a
    /// server id later shows up for the same position.
    fn rekey_position(&mut self, position: usize, id: &QuestionId) {
        let Some(previous) = self.positions.get(&position).cloned() else {
            return;
        };

        if &previous == id || !previous.is_synthetic() || self.records.contains_key(id) {
            return;
        }

        if let Some(mut record) = self.records.remove(&previous) {
            tracing::debug!(from = %previous, to = %id, "question id resolved");
            record.id = id.clone();
            self.records.insert(id.clone(), record);
            if self.active.as_ref() == Some(&previous) {
                self.active = Some(id.clone());
            }
        }
    }
}

/// Reads what the user currently has selected off a question's markup.
pub fn selection_from_markup(markup: &QuestionMarkup) -> Option<Selection> {
    match QuestionType::infer(markup) {
        QuestionType::Single => markup.checked_indices().first().copied().map(Selection::Single),
        QuestionType::Multiple => {
            let checked = markup.checked_indices();
            (!checked.is_empty()).then_some(Selection::Multiple(checked))
        }
        QuestionType::Cloze | QuestionType::MatrixSort | QuestionType::Unknown => {
            let values: Vec<&str> = markup
                .answers
                .iter()
                .filter(|answer| matches!(answer.input, InputKind::Text | InputKind::Select))
                .filter_map(|answer| answer.value.as_deref())
                .filter(|value| !value.trim().is_empty())
                .collect();
            (!values.is_empty()).then(|| Selection::Text(values.join("|")))
        }
    }
}

fn resolve_id(markup: &QuestionMarkup) -> QuestionId {
    markup
        .explicit_id()
        .or_else(|| markup.input_question_id())
        .map(QuestionId::from)
        .unwrap_or_else(|| QuestionId::synthetic(markup.position))
}

/// Correct answer from grading markers already in the DOM, else from
/// per-option data flags. Only choice questions can be resolved.
fn discover_correct_answer(kind: QuestionType, markup: &QuestionMarkup) -> Option<CorrectAnswer> {
    let marked: BTreeSet<usize> = markup
        .answers
        .iter()
        .enumerate()
        .filter(|(_, answer)| answer.marked_correct())
        .map(|(index, _)| index)
        .collect();

    let graded = if !marked.is_empty() {
        marked
    } else if markup.feedback == Feedback::Correct {
        markup.checked_indices()
    } else {
        BTreeSet::new()
    };

    if let Some(answer) = choice_answer(kind, graded) {
        return Some(answer);
    }

    let flagged: BTreeSet<usize> = markup
        .answers
        .iter()
        .enumerate()
        .filter(|(_, answer)| answer.data_correct)
        .map(|(index, _)| index)
        .collect();

    choice_answer(kind, flagged)
}

fn choice_answer(kind: QuestionType, indices: BTreeSet<usize>) -> Option<CorrectAnswer> {
    match kind {
        QuestionType::Single => indices.first().copied().map(CorrectAnswer::Single),
        QuestionType::Multiple if !indices.is_empty() => Some(CorrectAnswer::Multiple(indices)),
        _ => None,
    }
}
