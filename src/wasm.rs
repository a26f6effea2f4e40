#![cfg(target_arch = "wasm32")]

use crate::{
    ANSWER_CORRECT_CLASS, ANSWER_CORRECT_INCOMPLETE_CLASS, ANSWER_INCORRECT_CLASS,
    ANSWER_INPUT_CLASS, ANSWER_ITEM_CLASS, AnswerMarkup, Attachment, CHECK_BUTTON_SELECTOR,
    CLASS_CORRECT_CLASS, CLOZE_CLASS, Command, ControlKind, DomChange, DomObserver, ERROR_CLASS,
    FEEDBACK_CORRECT_CLASS, FEEDBACK_INCORRECT_CLASS, Feedback, HINT_CONTENT_CLASS,
    HINT_CONTROL_SELECTOR, IMAGE_CONTENT_CLASS, ImageRef, InputKind, LOADING_CLASS,
    LookupRequest, MATRIX_SORT_CLASS, MediaDescriptor, NEXT_BUTTON_SELECTOR, PollConfig,
    QUESTION_ITEM_CLASS, QUESTION_LIST_CLASS, QuestionId, QuestionMarkup, QuizSession,
    RESPONSE_CLASS, REVIEW_ITEM_SELECTOR, SidebarConfig, SidebarError, SidebarView, UiEffect,
    VIDEO_CONTENT_CLASS, parse_lookup_response, poll_until, selection_from_markup,
};
use gloo_net::http::Request;
use gloo_timers::future::TimeoutFuture;
use leptos::*;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    Document, Element, Event, HtmlElement, HtmlInputElement, HtmlSelectElement, MutationObserver,
    MutationObserverInit, MutationRecord, NodeList,
};

const CONFIG_GLOBAL: &str = "lilacQuizSidebar";
const QUIZ_CONTENT_SELECTOR: &str = ".wpProQuiz_content";
const SIDEBAR_CONTAINER_SELECTOR: &str = "#question-media";
const SIDEBAR_CONTENT_SELECTOR: &str = "#question-media .media-content";
const QUIZ_SELECTOR: &str = ".wpProQuiz_quiz";
const QUIZ_SIDEBAR_SELECTOR: &str = ".ld-quiz-sidebar";
const INPUT_SELECTOR: &str = "input, select, textarea";

const LOCKED_CLASS: &str = "lilac-locked";
const HINT_PROMPT_CLASS: &str = "lilac-hint-prompt";
const HINT_HIGHLIGHT_CLASS: &str = "lilac-hint-highlight";
const ENFORCE_HINT_BODY_CLASS: &str = "quiz-enforce-hint";
const INJECTED_CLASS: &str = "direct-injected";
const HAS_SIDEBAR_CLASS: &str = "has-sidebar";

/// The widget renders its quiz container some time after page load.
const INJECTION_POLL: PollConfig = PollConfig {
    interval_ms: 500,
    timeout_ms: 10_000,
};

const GRADING_CLASSES: [&str; 4] = [
    ANSWER_CORRECT_CLASS,
    ANSWER_CORRECT_INCOMPLETE_CLASS,
    CLASS_CORRECT_CLASS,
    ANSWER_INCORRECT_CLASS,
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct HintDialog {
    question: QuestionId,
    html: String,
}

fn js_error(error: JsValue) -> String {
    format!("{error:?}")
}

fn class_selector(class: &str) -> String {
    format!(".{class}")
}

fn find(element: &Element, selector: &str) -> Option<Element> {
    element.query_selector(selector).ok().flatten()
}

fn find_all(element: &Element, selector: &str) -> Vec<Element> {
    element
        .query_selector_all(selector)
        .map(|list| elements(&list))
        .unwrap_or_default()
}

fn elements(list: &NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|index| list.item(index))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

fn is_visible(element: &Element) -> bool {
    element
        .dyn_ref::<HtmlElement>()
        .is_some_and(|element| element.offset_parent().is_some())
}

fn class_names(element: &Element) -> Vec<String> {
    element
        .class_name()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn is_flagged_correct(element: &Element) -> bool {
    element.get_attribute("data-correct").as_deref() == Some("true")
}

fn set_display(root: &Element, selector: &str, display: &str) {
    for element in find_all(root, selector) {
        if let Some(element) = element.dyn_ref::<HtmlElement>() {
            let _ = element.style().set_property("display", display);
        }
    }
}

fn set_inputs_disabled(root: &Element, disabled: bool) {
    for input in find_all(root, INPUT_SELECTOR) {
        if let Some(input) = input.dyn_ref::<HtmlInputElement>() {
            input.set_disabled(disabled);
        } else if let Some(select) = input.dyn_ref::<HtmlSelectElement>() {
            select.set_disabled(disabled);
        }
    }
}

fn clear_inputs(root: &Element) {
    for input in find_all(root, INPUT_SELECTOR) {
        if let Some(input) = input.dyn_ref::<HtmlInputElement>() {
            match input.type_().as_str() {
                "radio" | "checkbox" => input.set_checked(false),
                _ => input.set_value(""),
            }
        } else if let Some(select) = input.dyn_ref::<HtmlSelectElement>() {
            select.set_selected_index(-1);
        }
    }
}

fn hide_feedback(root: &Element) {
    let answers = find_all(root, &class_selector(ANSWER_ITEM_CLASS));
    let inputs = find_all(root, INPUT_SELECTOR);
    for element in answers.iter().chain(inputs.iter()) {
        let classes = element.class_list();
        for class in GRADING_CLASSES {
            let _ = classes.remove_1(class);
        }
    }
    set_display(root, &class_selector(RESPONSE_CLASS), "none");
}

fn question_wrapper(target: &Element) -> Option<Element> {
    target
        .closest(&class_selector(QUESTION_ITEM_CLASS))
        .ok()
        .flatten()
}

fn control_kind(target: &Element) -> Option<ControlKind> {
    [
        (CHECK_BUTTON_SELECTOR, ControlKind::Check),
        (NEXT_BUTTON_SELECTOR, ControlKind::Next),
        (HINT_CONTROL_SELECTOR, ControlKind::Hint),
        (REVIEW_ITEM_SELECTOR, ControlKind::Review),
    ]
    .into_iter()
    .find(|(selector, _)| target.closest(selector).ok().flatten().is_some())
    .map(|(_, kind)| kind)
}

fn live_value(input: &Element, kind: InputKind) -> Option<String> {
    match kind {
        InputKind::Radio | InputKind::Checkbox => input.get_attribute("value"),
        _ => {
            if let Some(field) = input.dyn_ref::<HtmlInputElement>() {
                Some(field.value())
            } else if let Some(select) = input.dyn_ref::<HtmlSelectElement>() {
                Some(select.value())
            } else {
                input.text_content()
            }
        }
    }
}

fn read_answer(item: &Element) -> AnswerMarkup {
    let input =
        find(item, &class_selector(ANSWER_INPUT_CLASS)).or_else(|| find(item, INPUT_SELECTOR));
    let kind = input.as_ref().map_or(InputKind::Other, |input| {
        InputKind::from_element(&input.tag_name(), input.get_attribute("type").as_deref())
    });

    let mut answer = AnswerMarkup::new(kind);
    answer.classes = class_names(item);
    answer.data_correct = is_flagged_correct(item);

    if let Some(input) = &input {
        answer.classes.extend(class_names(input));
        answer.data_correct |= is_flagged_correct(input);
        answer.name = input.get_attribute("name");
        answer.value = live_value(input, kind);
        answer.checked = input
            .dyn_ref::<HtmlInputElement>()
            .is_some_and(HtmlInputElement::checked);
    }

    answer
}

/// Snapshots one question wrapper.
fn read_question(wrapper: &Element, position: usize) -> QuestionMarkup {
    let list = find(wrapper, &class_selector(QUESTION_LIST_CLASS));
    let correct = find(
        wrapper,
        &format!(".{RESPONSE_CLASS} .{FEEDBACK_CORRECT_CLASS}"),
    );
    let incorrect = find(
        wrapper,
        &format!(".{RESPONSE_CLASS} .{FEEDBACK_INCORRECT_CLASS}"),
    );
    let feedback = if correct.as_ref().is_some_and(is_visible) {
        Feedback::Correct
    } else if incorrect.as_ref().is_some_and(is_visible) {
        Feedback::Incorrect
    } else {
        Feedback::Hidden
    };
    let hint = find(wrapper, &class_selector(HINT_CONTENT_CLASS));

    QuestionMarkup {
        position,
        visible: is_visible(wrapper),
        meta: wrapper.get_attribute("data-question-meta").or_else(|| {
            find(wrapper, "[data-question-meta]")
                .and_then(|element| element.get_attribute("data-question-meta"))
        }),
        list_question_id: list.as_ref().and_then(|list| {
            list.get_attribute("data-question_id")
                .or_else(|| list.get_attribute("data-question-id"))
        }),
        list_element_id: list
            .as_ref()
            .map(Element::id)
            .filter(|id| !id.is_empty()),
        answers: find_all(wrapper, &class_selector(ANSWER_ITEM_CLASS))
            .iter()
            .map(read_answer)
            .collect(),
        has_cloze: find(wrapper, &class_selector(CLOZE_CLASS)).is_some(),
        has_matrix_sort: find(wrapper, &class_selector(MATRIX_SORT_CLASS)).is_some(),
        has_hint_control: hint.is_some() || find(wrapper, HINT_CONTROL_SELECTOR).is_some(),
        feedback,
        hint_html: hint.map(|hint| hint.inner_html()),
        first_image: find(wrapper, "img").and_then(|image| {
            image.get_attribute("src").map(|src| ImageRef {
                src,
                alt: image.get_attribute("alt"),
            })
        }),
    }
}

fn read_config() -> Result<SidebarConfig, String> {
    let global = js_sys::Reflect::get(&window(), &JsValue::from_str(CONFIG_GLOBAL))
        .map_err(js_error)?;
    if global.is_undefined() || global.is_null() {
        return Err(format!("`{CONFIG_GLOBAL}` is not defined"));
    }

    let json: String = js_sys::JSON::stringify(&global).map_err(js_error)?.into();
    SidebarConfig::from_json(&json).map_err(|error| error.to_string())
}

fn init_logging(debug: bool) {
    let mut config = tracing_wasm::WASMLayerConfigBuilder::new();
    config.set_max_level(if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    });
    tracing_wasm::set_as_global_default_with_config(config.build());
}

fn form_body(fields: &[(&'static str, String)]) -> String {
    fields
        .iter()
        .map(|(name, value)| {
            let value: String = js_sys::encode_uri_component(value).into();
            format!("{name}={value}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

async fn send_lookup(
    url: &str,
    request: &LookupRequest,
) -> Result<Option<MediaDescriptor>, SidebarError> {
    let failed = |error: gloo_net::Error| SidebarError::FetchFailed {
        reason: error.to_string(),
    };

    let response = Request::post(url)
        .header(
            "Content-Type",
            "application/x-www-form-urlencoded; charset=UTF-8",
        )
        .body(form_body(&request.form_fields()))
        .map_err(failed)?
        .send()
        .await
        .map_err(failed)?;

    if !response.ok() {
        return Err(SidebarError::FetchFailed {
            reason: format!("HTTP {}", response.status()),
        });
    }

    let body = response.text().await.map_err(failed)?;
    parse_lookup_response(&body)
}

#[component]
fn MediaContent(content: RwSignal<SidebarView>, on_image_error: Callback<String>) -> impl IntoView {
    move || match content.get() {
        SidebarView::Empty => ().into_view(),
        SidebarView::Loading => {
            view! { <div class="media-loading">"Loading media..."</div> }.into_view()
        }
        SidebarView::Error => {
            view! { <div class="media-error">"Media unavailable"</div> }.into_view()
        }
        SidebarView::Image { src, alt } => {
            let failed = src.clone();
            view! {
                <img
                    class="question-media-img"
                    src=src
                    alt=alt
                    on:error=move |_| on_image_error.call(failed.clone())
                />
            }
            .into_view()
        }
        SidebarView::Embed { src } => view! {
            <iframe src=src frameborder="0" allowfullscreen=true width="100%" height="200"></iframe>
        }
        .into_view(),
        SidebarView::EmbedCode { html } => {
            view! { <div class="question-media-embed" inner_html=html></div> }.into_view()
        }
        SidebarView::Video { src } => view! {
            <video class="question-media-video-player" src=src controls=true width="100%"></video>
        }
        .into_view(),
    }
}

#[component]
fn HintModal(dialog: RwSignal<Option<HintDialog>>, on_close: Callback<QuestionId>) -> impl IntoView {
    move || {
        dialog.get().map(|current| {
            let question = current.question.clone();
            view! {
                <div class="lilac-hint-modal" role="dialog" aria-modal="true">
                    <div class="lilac-hint-modal-content">
                        <h3 class="lilac-hint-title">"Hint"</h3>
                        <div class="lilac-hint-body" inner_html=current.html></div>
                        <button
                            class="lilac-hint-close"
                            type="button"
                            on:click=move |_| on_close.call(question.clone())
                        >
                            "Close"
                        </button>
                    </div>
                </div>
            }
        })
    }
}

/// Browser side of one quiz page.
#[derive(Clone)]
struct PageBinding {
    session: Rc<RefCell<QuizSession>>,
    observer: Rc<RefCell<DomObserver<Element>>>,
    watcher: Rc<RefCell<Option<MutationObserver>>>,
    root: Element,
    media: RwSignal<SidebarView>,
    hint: RwSignal<Option<HintDialog>>,
}

impl PageBinding {
    fn new(config: SidebarConfig, root: Element) -> Self {
        let mut observer = DomObserver::new();
        observer.on_questions_discovered(|questions| {
            tracing::debug!(count = questions.len(), "quiz questions discovered");
        });
        observer.on_answer_feedback(|question, correct| {
            tracing::debug!(position = question.position, correct, "widget graded an answer");
        });
        observer.on_control_activated(
            |question| tracing::debug!(position = question.position, "review list clicked"),
            ControlKind::Review,
        );

        Self {
            session: Rc::new(RefCell::new(QuizSession::new(config))),
            observer: Rc::new(RefCell::new(observer)),
            watcher: Rc::new(RefCell::new(None)),
            root,
            media: create_rw_signal(SidebarView::Empty),
            hint: create_rw_signal(None),
        }
    }

    fn question_elements(&self) -> Vec<Element> {
        find_all(&self.root, &class_selector(QUESTION_ITEM_CLASS))
    }

    fn read_questions(&self) -> Vec<QuestionMarkup> {
        self.question_elements()
            .iter()
            .enumerate()
            .map(|(position, wrapper)| read_question(wrapper, position))
            .collect()
    }

    fn locate(&self, target: &Element) -> Option<(Element, usize)> {
        let wrapper = question_wrapper(target)?;
        let position = self
            .question_elements()
            .iter()
            .position(|element| *element == wrapper)?;
        Some((wrapper, position))
    }

    fn element_of(&self, question: &QuestionId) -> Option<(Element, usize)> {
        let position = self.session.borrow().tracker().record(question)?.position;
        let wrapper = self.question_elements().into_iter().nth(position)?;
        Some((wrapper, position))
    }

    fn active_element(&self) -> Option<(Element, usize)> {
        let active = self.session.borrow().tracker().active().cloned()?;
        self.element_of(&active)
    }

    fn question_markup(&self, question: &QuestionId) -> Option<QuestionMarkup> {
        self.element_of(question)
            .map(|(wrapper, position)| read_question(&wrapper, position))
    }

    /// Carries out commands; returns `true` when the current click must be
    /// cancelled.
    fn run(&self, commands: Vec<Command>) -> bool {
        let mut block = false;

        for command in commands {
            match command {
                Command::Ui { question, effect } => self.apply(&question, effect),
                Command::BlockProceed(_) => block = true,
                Command::Lookup(request) => self.spawn_lookup(request),
                Command::WatchOutcome(question) => self.spawn_watch(question),
                Command::Render(view) => self.media.set(view),
            }
        }

        // Our own writes must not come back as host widget changes.
        if let Some(watcher) = self.watcher.borrow().as_ref() {
            let _ = watcher.take_records();
        }

        block
    }

    fn apply(&self, question: &QuestionId, effect: UiEffect) {
        let Some((wrapper, _)) = self.element_of(question) else {
            tracing::debug!(question = %question, ?effect, "question element not found");
            return;
        };
        let list = find(&wrapper, &class_selector(QUESTION_LIST_CLASS));

        match effect {
            UiEffect::ShowProceed => set_display(&wrapper, NEXT_BUTTON_SELECTOR, "inline-block"),
            UiEffect::HideProceed => set_display(&wrapper, NEXT_BUTTON_SELECTOR, "none"),
            UiEffect::ShowCheck => set_display(&wrapper, CHECK_BUTTON_SELECTOR, "inline-block"),
            UiEffect::LockInputs { allow_reselect } => {
                if let Some(list) = &list {
                    let _ = list.class_list().add_1(LOCKED_CLASS);
                }
                if !allow_reselect {
                    set_inputs_disabled(&wrapper, true);
                }
            }
            UiEffect::UnlockInputs => {
                if let Some(list) = &list {
                    let _ = list.class_list().remove_1(LOCKED_CLASS);
                }
                set_inputs_disabled(&wrapper, false);
            }
            UiEffect::ShowHintPrompt => self.show_hint_prompt(&wrapper),
            UiEffect::HighlightHint => {
                for control in find_all(&wrapper, HINT_CONTROL_SELECTOR) {
                    let _ = control.class_list().add_1(HINT_HIGHLIGHT_CLASS);
                }
            }
            UiEffect::ClearHintPrompt => {
                for prompt in find_all(&wrapper, &class_selector(HINT_PROMPT_CLASS)) {
                    prompt.remove();
                }
                for control in find_all(&wrapper, HINT_CONTROL_SELECTOR) {
                    let _ = control.class_list().remove_1(HINT_HIGHLIGHT_CLASS);
                }
            }
            UiEffect::OpenHint => {
                let html = self
                    .session
                    .borrow()
                    .tracker()
                    .record(question)
                    .and_then(|record| record.hint_html.clone())
                    .unwrap_or_default();
                self.hint.set(Some(HintDialog {
                    question: question.clone(),
                    html,
                }));
            }
            UiEffect::ClearSelection => clear_inputs(&wrapper),
            UiEffect::HideFeedback => hide_feedback(&wrapper),
        }
    }

    fn show_hint_prompt(&self, wrapper: &Element) {
        if find(wrapper, &class_selector(HINT_PROMPT_CLASS)).is_some() {
            return;
        }
        let Ok(prompt) = document().create_element("div") else {
            return;
        };
        prompt.set_class_name(HINT_PROMPT_CLASS);
        prompt.set_text_content(Some(&self.session.borrow().config().hint_prompt_text));

        let placed = find(wrapper, HINT_CONTROL_SELECTOR)
            .and_then(|control| control.insert_adjacent_element("afterend", &prompt).ok());
        if placed.is_none() {
            let _ = wrapper.append_child(&prompt);
        }
    }

    fn spawn_lookup(&self, request: LookupRequest) {
        let binding = self.clone();
        let url = self.session.borrow().config().ajax_url.clone();

        spawn_local(async move {
            let result = send_lookup(&url, &request).await;
            let commands = binding
                .session
                .borrow_mut()
                .media_completed(&request.key, result);
            binding.run(commands);
        });
    }

    fn spawn_watch(&self, question: QuestionId) {
        let binding = self.clone();
        let poll = self.session.borrow().config().poll;

        spawn_local(async move {
            let probe = binding.clone();
            let probed = question.clone();
            let result = poll_until(
                poll,
                move || {
                    probe
                        .question_markup(&probed)
                        .and_then(|markup| markup.graded_outcome())
                },
                |outcome: &Option<bool>| outcome.is_some(),
                TimeoutFuture::new,
            )
            .await;

            let commands = match result {
                Ok(Some(correct)) => binding
                    .session
                    .borrow_mut()
                    .outcome_observed(&question, correct),
                Ok(None) => Vec::new(),
                Err(timeout) => binding
                    .session
                    .borrow_mut()
                    .outcome_timed_out(&question, timeout.into()),
            };
            binding.run(commands);
        });
    }

    /// Translates one batch of mutation records, keeping their order and
    /// dropping repeats of the same attribute on the same question.
    fn collect_changes(&self, records: &js_sys::Array) -> Vec<DomChange> {
        let wrappers = self.question_elements();
        let item_selector = class_selector(QUESTION_ITEM_CLASS);
        let mut changes = Vec::new();
        let mut inserted = false;
        let mut seen: Vec<(usize, String)> = Vec::new();

        for record in records.iter() {
            let Ok(record) = record.dyn_into::<MutationRecord>() else {
                continue;
            };

            match record.type_().as_str() {
                "childList" if !inserted => {
                    let adds_questions = elements(&record.added_nodes()).iter().any(|node| {
                        node.matches(&item_selector).unwrap_or(false)
                            || find(node, &item_selector).is_some()
                    });
                    if adds_questions {
                        inserted = true;
                        changes.push(DomChange::Inserted(
                            wrappers
                                .iter()
                                .enumerate()
                                .map(|(position, wrapper)| read_question(wrapper, position))
                                .collect(),
                        ));
                    }
                }
                "attributes" => {
                    let Some(attribute) = record.attribute_name() else {
                        continue;
                    };
                    let Some(target) = record
                        .target()
                        .and_then(|node| node.dyn_into::<Element>().ok())
                    else {
                        continue;
                    };
                    let Some(wrapper) = question_wrapper(&target) else {
                        continue;
                    };
                    let Some(position) = wrappers.iter().position(|element| *element == wrapper)
                    else {
                        continue;
                    };

                    if seen
                        .iter()
                        .any(|(known, name)| *known == position && *name == attribute)
                    {
                        continue;
                    }
                    seen.push((position, attribute.clone()));
                    changes.push(DomChange::AttributeChanged {
                        question: read_question(&wrapper, position),
                        attribute,
                    });
                }
                _ => {}
            }
        }

        changes
    }

    fn watch(&self) -> Result<(), String> {
        if self.observer.borrow_mut().attach(self.root.clone()) == Attachment::AlreadyAttached {
            return Ok(());
        }

        let binding = self.clone();
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _: MutationObserver| {
                let changes = binding.collect_changes(&records);
                if changes.is_empty() {
                    return;
                }

                let events = binding.observer.borrow_mut().dispatch(changes);
                for event in events {
                    let commands = binding.session.borrow_mut().handle(event);
                    binding.run(commands);
                }
            },
        );

        let watcher = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(js_error)?;
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        options.set_attributes(true);
        options.set_attribute_filter(&js_sys::Array::of2(
            &JsValue::from_str("class"),
            &JsValue::from_str("style"),
        ));
        watcher
            .observe_with_options(&self.root, &options)
            .map_err(js_error)?;

        callback.forget();
        *self.watcher.borrow_mut() = Some(watcher);
        Ok(())
    }

    fn on_click(&self, event: &Event) {
        let Some(target) = event
            .target()
            .and_then(|target| target.dyn_into::<Element>().ok())
        else {
            return;
        };
        let Some(kind) = control_kind(&target) else {
            return;
        };
        // The review list sits outside the question wrappers and always
        // leaves the active question.
        let located = match kind {
            ControlKind::Review => self.active_element(),
            _ => self.locate(&target),
        };
        let Some((wrapper, position)) = located else {
            return;
        };

        let activation = self
            .observer
            .borrow_mut()
            .control_activated(kind, read_question(&wrapper, position));
        let commands = self.session.borrow_mut().handle(activation);

        if self.run(commands) {
            event.prevent_default();
            event.stop_propagation();
        }
    }

    fn on_change(&self, event: &Event) {
        let Some(target) = event
            .target()
            .and_then(|target| target.dyn_into::<Element>().ok())
        else {
            return;
        };
        let Some((wrapper, position)) = self.locate(&target) else {
            return;
        };

        let markup = read_question(&wrapper, position);
        let Some(selection) = selection_from_markup(&markup) else {
            return;
        };

        let commands = {
            let mut session = self.session.borrow_mut();
            let question = session.discover(&markup);
            session.selection_changed(&question, selection)
        };
        self.run(commands);
    }

    fn listen(&self) -> Result<(), String> {
        let binding = self.clone();
        let on_click = Closure::<dyn FnMut(_)>::new(move |event: Event| binding.on_click(&event));
        // Capture phase, so a blocked "next" never reaches the widget's own handler.
        self.root
            .add_event_listener_with_callback_and_bool(
                "click",
                on_click.as_ref().unchecked_ref(),
                true,
            )
            .map_err(js_error)?;
        on_click.forget();

        let binding = self.clone();
        let on_change = Closure::<dyn FnMut(_)>::new(move |event: Event| binding.on_change(&event));
        self.root
            .add_event_listener_with_callback("change", on_change.as_ref().unchecked_ref())
            .map_err(js_error)?;
        on_change.forget();

        Ok(())
    }

    fn mount_sidebar(&self, document: &Document) {
        let Some(content) = document
            .query_selector(SIDEBAR_CONTENT_SELECTOR)
            .ok()
            .flatten()
        else {
            tracing::debug!("no media sidebar on this page");
            return;
        };
        let container = document
            .query_selector(SIDEBAR_CONTAINER_SELECTOR)
            .ok()
            .flatten();
        let Ok(content) = content.dyn_into::<HtmlElement>() else {
            return;
        };
        content.set_inner_html("");

        let media = self.media;
        let content_classes = content.class_list();
        let binding = self.clone();
        let on_image_error = Callback::new(move |src: String| {
            let commands = binding.session.borrow_mut().image_failed(&src);
            binding.run(commands);
        });

        mount_to(content, move || {
            create_effect(move |_| {
                let current = media.get();
                if let Some(container) = &container {
                    let classes = container.class_list();
                    for class in [LOADING_CLASS, ERROR_CLASS] {
                        let _ = classes
                            .toggle_with_force(class, current.container_class() == Some(class));
                    }
                }
                for class in [IMAGE_CONTENT_CLASS, VIDEO_CONTENT_CLASS] {
                    let _ = content_classes
                        .toggle_with_force(class, current.content_class() == Some(class));
                }
            });

            view! { <MediaContent content=media on_image_error=on_image_error /> }
        });
    }

    fn mount_hint_modal(&self, document: &Document) -> Result<(), String> {
        let body = document.body().ok_or("document has no body")?;
        let host = document
            .create_element("div")
            .map_err(js_error)?
            .dyn_into::<HtmlElement>()
            .map_err(|_| "created element is not an HTMLElement".to_string())?;
        host.set_class_name("lilac-hint-modal-host");
        body.append_child(&host).map_err(js_error)?;

        let dialog = self.hint;
        let binding = self.clone();
        let on_close = Callback::new(move |question: QuestionId| {
            binding.hint.set(None);
            let commands = binding.session.borrow_mut().hint_closed(&question);
            binding.run(commands);
        });

        mount_to(host, move || view! { <HintModal dialog=dialog on_close=on_close /> });
        Ok(())
    }
}

/// Moves the theme's quiz sidebar into the quiz container once the widget
/// has rendered it.
fn inject_sidebar() {
    spawn_local(async {
        let quiz = poll_until(
            INJECTION_POLL,
            || document().query_selector(QUIZ_SELECTOR).ok().flatten(),
            |quiz: &Option<Element>| quiz.is_some(),
            TimeoutFuture::new,
        )
        .await;

        let quiz = match quiz {
            Ok(Some(quiz)) => quiz,
            Ok(None) => return,
            Err(timeout) => {
                let error: SidebarError = timeout.into();
                tracing::debug!("{error}; quiz container never appeared, sidebar left in place");
                return;
            }
        };
        let Some(sidebar) = document().query_selector(QUIZ_SIDEBAR_SELECTOR).ok().flatten() else {
            return;
        };

        let _ = sidebar.class_list().add_1(INJECTED_CLASS);
        if let Err(error) = quiz.append_child(&sidebar) {
            tracing::warn!("moving the quiz sidebar failed: {}", js_error(error));
            return;
        }
        let _ = quiz.class_list().add_1(HAS_SIDEBAR_CLASS);
    });
}

fn start(config: SidebarConfig) -> Result<(), String> {
    let document = document();
    let root = document
        .query_selector(QUIZ_CONTENT_SELECTOR)
        .ok()
        .flatten()
        .or_else(|| document.body().map(Element::from))
        .ok_or("document has no body")?;

    if config.enforce_hint {
        if let Some(body) = document.body() {
            let _ = body.class_list().add_1(ENFORCE_HINT_BODY_CLASS);
        }
    }
    let sidebar_enabled = config.sidebar_enabled;

    let binding = PageBinding::new(config, root);
    if sidebar_enabled {
        inject_sidebar();
    }
    binding.mount_sidebar(&document);
    binding.mount_hint_modal(&document)?;
    binding.watch()?;
    binding.listen()?;

    let questions = binding.read_questions();
    let commands = binding.session.borrow_mut().navigation_settled(&questions);
    binding.run(commands);
    Ok(())
}

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();

    let config = read_config();
    init_logging(config.as_ref().is_ok_and(|config| config.debug));

    let config = config.unwrap_or_else(|error| {
        tracing::warn!("{error}; using default settings");
        SidebarConfig::default()
    });

    if let Err(error) = start(config) {
        tracing::error!("quiz sidebar failed to start: {error}");
    }
}
