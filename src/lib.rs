pub mod config;
pub mod error;
pub mod markup;
pub mod media;
pub mod observer;
pub mod policy;
pub mod session;
pub mod sidebar;
pub mod tracker;
pub mod wasm;

pub use config::{DEFAULT_HINT_PROMPT, DEFAULT_PLACEHOLDER_URL, SidebarConfig};
pub use error::{ConfigError, SidebarError};
pub use markup::{
    ANSWER_CORRECT_CLASS, ANSWER_CORRECT_INCOMPLETE_CLASS, ANSWER_INCORRECT_CLASS,
    ANSWER_INPUT_CLASS, ANSWER_ITEM_CLASS, AnswerMarkup, CHECK_BUTTON_SELECTOR,
    CLASS_CORRECT_CLASS, CLOZE_CLASS, FEEDBACK_CORRECT_CLASS, FEEDBACK_INCORRECT_CLASS, Feedback,
    Grade, HINT_CONTENT_CLASS, HINT_CONTROL_SELECTOR, ImageRef, InputKind, MATRIX_SORT_CLASS,
    NEXT_BUTTON_SELECTOR, QUESTION_ITEM_CLASS, QUESTION_LIST_CLASS, QuestionMarkup,
    RESPONSE_CLASS, REVIEW_ITEM_SELECTOR,
};
pub use media::{
    LookupKind, LookupRequest, MediaClient, MediaDescriptor, MediaKey, MediaKind,
    MediaResolution, MediaSource, parse_lookup_response, vimeo_id_from_url, youtube_id_from_url,
};
pub use observer::{
    Attachment, ControlKind, DomChange, DomObserver, ObserverEvent, PollConfig, PollTimeout,
    normalize, poll_until,
};
pub use policy::{GateState, HintPolicy, HintRequirement, ProceedDecision, UiEffect};
pub use session::{Command, QuizSession};
pub use sidebar::{
    ERROR_CLASS, IMAGE_CONTENT_CLASS, LOADING_CLASS, Sidebar, SidebarView, VIDEO_CONTENT_CLASS,
    is_video_file, render,
};
pub use tracker::{
    CorrectAnswer, Discovery, QuestionId, QuestionRecord, QuestionTracker, QuestionType,
    Selection, SelectionChange, selection_from_markup,
};
