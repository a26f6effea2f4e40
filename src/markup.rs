//! Snapshot model of the host quiz widget's markup.
//!
//! The widget exposes no API, only DOM conventions. The browser layer reads
//! each question wrapper into a [`QuestionMarkup`] so that everything which
//! interprets those conventions can run (and be tested) without a DOM.

use std::collections::BTreeSet;

pub const QUESTION_ITEM_CLASS: &str = "wpProQuiz_listItem";
pub const QUESTION_LIST_CLASS: &str = "wpProQuiz_questionList";
pub const ANSWER_ITEM_CLASS: &str = "wpProQuiz_questionListItem";
pub const ANSWER_INPUT_CLASS: &str = "wpProQuiz_questionInput";
pub const RESPONSE_CLASS: &str = "wpProQuiz_response";
pub const FEEDBACK_CORRECT_CLASS: &str = "wpProQuiz_correct";
pub const FEEDBACK_INCORRECT_CLASS: &str = "wpProQuiz_incorrect";
pub const HINT_CONTENT_CLASS: &str = "wpProQuiz_tipp";
pub const CLOZE_CLASS: &str = "wpProQuiz_cloze";
pub const MATRIX_SORT_CLASS: &str = "wpProQuiz_matrixSortString";

pub const ANSWER_CORRECT_CLASS: &str = "wpProQuiz_answerCorrect";
pub const ANSWER_CORRECT_INCOMPLETE_CLASS: &str = "wpProQuiz_answerCorrectIncomplete";
pub const CLASS_CORRECT_CLASS: &str = "wpProQuiz_classCorrect";
pub const ANSWER_INCORRECT_CLASS: &str = "wpProQuiz_answerIncorrect";

pub const CHECK_BUTTON_SELECTOR: &str = ".wpProQuiz_button[name=\"check\"]";
pub const NEXT_BUTTON_SELECTOR: &str = ".wpProQuiz_button[name=\"next\"]";
pub const HINT_CONTROL_SELECTOR: &str =
    ".wpProQuiz_button[name=\"tip\"], .wpProQuiz_TipButton, .wpProQuiz_hint";
pub const REVIEW_ITEM_SELECTOR: &str = ".wpProQuiz_reviewQuestion li";

/// Classes the host widget puts on an answer once it has graded it.
const CORRECT_MARKERS: [&str; 3] = [
    ANSWER_CORRECT_CLASS,
    ANSWER_CORRECT_INCOMPLETE_CLASS,
    CLASS_CORRECT_CLASS,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputKind {
    Radio,
    Checkbox,
    Select,
    Text,
    #[default]
    Other,
}

impl InputKind {
    /// Maps an element tag and its `type` attribute onto an input kind.
    pub fn from_element(tag: &str, type_attr: Option<&str>) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "select" => Self::Select,
            "textarea" => Self::Text,
            "input" => match type_attr.map(str::to_ascii_lowercase).as_deref() {
                Some("radio") => Self::Radio,
                Some("checkbox") => Self::Checkbox,
                Some("text") | None => Self::Text,
                Some(_) => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Correct,
    Incorrect,
}

/// Question-level feedback block shown by the widget after a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Feedback {
    #[default]
    Hidden,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub src: String,
    pub alt: Option<String>,
}

/// One `.wpProQuiz_questionListItem` and the input inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMarkup {
    pub input: InputKind,
    pub name: Option<String>,
    pub value: Option<String>,
    pub checked: bool,
    /// Classes of the list item and of its input, merged.
    pub classes: Vec<String>,
    /// `data-correct="true"` on the item or the input.
    pub data_correct: bool,
}

impl AnswerMarkup {
    pub fn new(input: InputKind) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn radio(name: &str, value: &str) -> Self {
        Self::new(InputKind::Radio).named(name, value)
    }

    pub fn checkbox(name: &str, value: &str) -> Self {
        Self::new(InputKind::Checkbox).named(name, value)
    }

    pub fn named(mut self, name: &str, value: &str) -> Self {
        self.name = Some(name.to_string());
        self.value = Some(value.to_string());
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn flagged_correct(mut self) -> Self {
        self.data_correct = true;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|current| current == class)
    }

    /// Whether the widget has annotated this answer as the correct one.
    pub fn marked_correct(&self) -> bool {
        CORRECT_MARKERS.iter().any(|marker| self.has_class(marker))
    }

    pub fn grade(&self) -> Option<Grade> {
        if self.marked_correct() {
            Some(Grade::Correct)
        } else if self.has_class(ANSWER_INCORRECT_CLASS) {
            Some(Grade::Incorrect)
        } else {
            None
        }
    }
}

/// One `.wpProQuiz_listItem` as observed at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionMarkup {
    /// Index among the question wrappers of the quiz.
    pub position: usize,
    pub visible: bool,
    /// Raw `data-question-meta` JSON.
    pub meta: Option<String>,
    /// `data-question_id` / `data-question-id` on the answer list.
    pub list_question_id: Option<String>,
    /// `id` attribute of the answer list.
    pub list_element_id: Option<String>,
    pub answers: Vec<AnswerMarkup>,
    pub has_cloze: bool,
    pub has_matrix_sort: bool,
    pub has_hint_control: bool,
    pub feedback: Feedback,
    pub hint_html: Option<String>,
    pub first_image: Option<ImageRef>,
}

impl QuestionMarkup {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn visible(mut self) -> Self {
        self.visible = true;
        self
    }

    pub fn with_answers(mut self, answers: Vec<AnswerMarkup>) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_hint(mut self, html: &str) -> Self {
        self.has_hint_control = true;
        self.hint_html = Some(html.to_string());
        self
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_list_id(mut self, id: &str) -> Self {
        self.list_question_id = Some(id.to_string());
        self
    }

    pub fn with_image(mut self, src: &str) -> Self {
        self.first_image = Some(ImageRef {
            src: src.to_string(),
            alt: None,
        });
        self
    }

    pub fn has_input(&self, kind: InputKind) -> bool {
        self.answers.iter().any(|answer| answer.input == kind)
    }

    pub fn checked_indices(&self) -> BTreeSet<usize> {
        self.answers
            .iter()
            .enumerate()
            .filter(|(_, answer)| answer.checked)
            .map(|(index, _)| index)
            .collect()
    }

    /// Server-assigned id carried by the question markup itself, checked in
    /// order: question meta, answer list data attribute, answer list `id`.
    pub fn explicit_id(&self) -> Option<String> {
        if let Some(id) = self.meta.as_deref().and_then(question_id_from_meta) {
            return Some(id);
        }

        if let Some(id) = self
            .list_question_id
            .as_deref()
            .map(str::trim)
            .filter(|id| is_numeric(id))
        {
            return Some(id.to_string());
        }

        self.list_element_id
            .as_deref()
            .and_then(numeric_suffix)
            .map(str::to_string)
    }

    /// Question id embedded in an input name, preferring the checked input.
    pub fn input_question_id(&self) -> Option<String> {
        let checked = self.answers.iter().filter(|answer| answer.checked);
        let rest = self.answers.iter().filter(|answer| !answer.checked);

        checked
            .chain(rest)
            .filter_map(|answer| answer.name.as_deref())
            .find_map(question_id_from_input_name)
    }

    /// Reads the widget's grading of the current attempt, if it has graded.
    ///
    /// An incorrect marker on any checked answer fails the attempt, even when
    /// other checked answers are marked correct. Then a correct marker on a
    /// checked answer, then an incorrect marker on any answer, then the
    /// question-level feedback block.
    pub fn graded_outcome(&self) -> Option<bool> {
        let checked_grades: Vec<Grade> = self
            .answers
            .iter()
            .filter(|answer| answer.checked)
            .filter_map(AnswerMarkup::grade)
            .collect();

        if checked_grades.contains(&Grade::Incorrect) {
            return Some(false);
        }
        if checked_grades.contains(&Grade::Correct) {
            return Some(true);
        }

        if self
            .answers
            .iter()
            .any(|answer| answer.has_class(ANSWER_INCORRECT_CLASS))
        {
            return Some(false);
        }

        match self.feedback {
            Feedback::Correct => Some(true),
            Feedback::Incorrect => Some(false),
            Feedback::Hidden => None,
        }
    }
}

fn is_numeric(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|byte| byte.is_ascii_digit())
}

/// Returns the last `_`-separated segment when it is numeric.
pub fn numeric_suffix(raw: &str) -> Option<&str> {
    let (_, last) = raw.rsplit_once('_')?;
    is_numeric(last).then_some(last)
}

/// Extracts the question id from names like `question_5_42` or `question_42`.
pub fn question_id_from_input_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix("question_")?;
    let last = rest.rsplit('_').next()?;
    is_numeric(last).then(|| last.to_string())
}

/// Extracts `question_post_id` from the widget's per-question meta JSON.
pub fn question_id_from_meta(meta: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(meta).ok()?;

    match value.get("question_post_id")? {
        serde_json::Value::Number(number) => number.as_u64().map(|id| id.to_string()),
        serde_json::Value::String(text) if is_numeric(text.trim()) => {
            Some(text.trim().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_kind_from_element() {
        assert_eq!(InputKind::from_element("INPUT", Some("radio")), InputKind::Radio);
        assert_eq!(
            InputKind::from_element("input", Some("Checkbox")),
            InputKind::Checkbox
        );
        assert_eq!(InputKind::from_element("select", None), InputKind::Select);
        assert_eq!(InputKind::from_element("input", None), InputKind::Text);
        assert_eq!(InputKind::from_element("input", Some("hidden")), InputKind::Other);
    }

    #[test]
    fn parses_question_id_from_input_names() {
        assert_eq!(question_id_from_input_name("question_5_42").as_deref(), Some("42"));
        assert_eq!(question_id_from_input_name("question_42").as_deref(), Some("42"));
        assert_eq!(question_id_from_input_name("question_5_abc"), None);
        assert_eq!(question_id_from_input_name("answer_5_42"), None);
    }

    #[test]
    fn parses_question_meta() {
        assert_eq!(
            question_id_from_meta(r#"{"question_post_id": 1234, "type": "single"}"#).as_deref(),
            Some("1234")
        );
        assert_eq!(
            question_id_from_meta(r#"{"question_post_id": "77"}"#).as_deref(),
            Some("77")
        );
        assert_eq!(question_id_from_meta(r#"{"question_post_id": ""}"#), None);
        assert_eq!(question_id_from_meta("not json"), None);
    }

    #[test]
    fn explicit_id_priority() {
        let mut question = QuestionMarkup::new(0);
        question.list_element_id = Some("wpProQuiz_questionList_9".to_string());
        assert_eq!(question.explicit_id().as_deref(), Some("9"));

        question.list_question_id = Some("15".to_string());
        assert_eq!(question.explicit_id().as_deref(), Some("15"));

        question.meta = Some(r#"{"question_post_id": 300}"#.to_string());
        assert_eq!(question.explicit_id().as_deref(), Some("300"));
    }

    #[test]
    fn input_question_id_prefers_checked_input() {
        let question = QuestionMarkup::new(0).with_answers(vec![
            AnswerMarkup::new(InputKind::Radio).named("other", "1"),
            AnswerMarkup::radio("question_3_88", "2").checked(),
        ]);
        assert_eq!(question.input_question_id().as_deref(), Some("88"));
    }

    #[test]
    fn graded_outcome_reads_checked_answer_first() {
        let question = QuestionMarkup::new(0)
            .with_answers(vec![
                AnswerMarkup::radio("question_1_2", "1")
                    .checked()
                    .with_class(ANSWER_CORRECT_INCOMPLETE_CLASS),
                AnswerMarkup::radio("question_1_2", "2"),
            ])
            .with_feedback(Feedback::Incorrect);

        assert_eq!(question.graded_outcome(), Some(true));
    }

    #[test]
    fn one_wrong_checkbox_fails_the_attempt() {
        let question = QuestionMarkup::new(0).with_answers(vec![
            AnswerMarkup::checkbox("question_1_3", "1")
                .checked()
                .with_class(ANSWER_CORRECT_CLASS),
            AnswerMarkup::checkbox("question_1_3", "2")
                .checked()
                .with_class(ANSWER_INCORRECT_CLASS),
            AnswerMarkup::checkbox("question_1_3", "3"),
        ]);

        assert_eq!(question.graded_outcome(), Some(false));
    }

    #[test]
    fn graded_outcome_falls_back_to_incorrect_marker_then_feedback() {
        let marked = QuestionMarkup::new(0).with_answers(vec![
            AnswerMarkup::radio("question_1_2", "1").with_class(ANSWER_INCORRECT_CLASS),
        ]);
        assert_eq!(marked.graded_outcome(), Some(false));

        let feedback_only = QuestionMarkup::new(0)
            .with_answers(vec![AnswerMarkup::radio("question_1_2", "1").checked()])
            .with_feedback(Feedback::Correct);
        assert_eq!(feedback_only.graded_outcome(), Some(true));

        let ungraded = QuestionMarkup::new(0)
            .with_answers(vec![AnswerMarkup::radio("question_1_2", "1").checked()]);
        assert_eq!(ungraded.graded_outcome(), None);
    }
}
