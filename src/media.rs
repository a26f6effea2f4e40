use std::collections::HashSet;
use std::fmt;

use crate::config::SidebarConfig;
use crate::error::SidebarError;
use crate::markup::ImageRef;
use crate::tracker::QuestionId;

const FALLBACK_ALT: &str = "Quiz media";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    #[default]
    #[serde(other)]
    None,
}

/// Media returned by the lookup endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MediaDescriptor {
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub youtube_id: Option<String>,
    #[serde(default)]
    pub vimeo_id: Option<String>,
    #[serde(default)]
    pub embed_code: Option<String>,
}

impl MediaDescriptor {
    pub fn image(url: impl Into<String>, alt: Option<String>) -> Self {
        Self {
            kind: MediaKind::Image,
            url: Some(url.into()),
            alt,
            ..Self::default()
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn url(&self) -> Option<&str> {
        present(&self.url)
    }

    pub fn youtube_id(&self) -> Option<&str> {
        present(&self.youtube_id)
    }

    pub fn vimeo_id(&self) -> Option<&str> {
        present(&self.vimeo_id)
    }

    pub fn embed_code(&self) -> Option<&str> {
        present(&self.embed_code)
    }

    /// Whether the sidebar can show something for this descriptor.
    pub fn is_renderable(&self) -> bool {
        match self.kind {
            MediaKind::Image => self.url().is_some(),
            MediaKind::Video => {
                self.youtube_id().is_some()
                    || self.vimeo_id().is_some()
                    || self.embed_code().is_some()
                    || self.url().is_some()
            }
            MediaKind::None => false,
        }
    }

    /// Fills in platform ids that can be read off a video URL.
    pub fn normalized(mut self) -> Self {
        if self.kind != MediaKind::Video || self.youtube_id().is_some() || self.vimeo_id().is_some()
        {
            return self;
        }

        if let Some(url) = self.url() {
            if let Some(id) = youtube_id_from_url(url) {
                self.youtube_id = Some(id);
            } else if let Some(id) = vimeo_id_from_url(url) {
                self.vimeo_id = Some(id);
            }
        }
        self
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn take_youtube_id(rest: &str) -> Option<String> {
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(11)
        .collect();
    (id.len() == 11).then_some(id)
}

/// Accepts `watch?v=`, `youtu.be/`, `/embed/` and `/v/` URLs.
pub fn youtube_id_from_url(url: &str) -> Option<String> {
    if let Some((_, rest)) = url.split_once("youtu.be/") {
        return take_youtube_id(rest);
    }

    let (_, rest) = url.split_once("youtube.com/")?;
    for prefix in ["embed/", "v/", "e/"] {
        if let Some(rest) = rest.strip_prefix(prefix) {
            return take_youtube_id(rest);
        }
    }

    let (_, query) = rest.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v="))
        .and_then(take_youtube_id)
}

pub fn vimeo_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("vimeo.com/")?;
    let rest = rest.strip_prefix("video/").unwrap_or(rest);
    let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Question,
    Answer,
}

impl LookupKind {
    /// Server action name.
    pub fn action(self) -> &'static str {
        match self {
            Self::Question => "get_question_acf_media",
            Self::Answer => "get_answer_specific_media",
        }
    }
}

/// Identity of one lookup: a question, optionally narrowed to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    pub question: QuestionId,
    pub answer: Option<String>,
}

impl MediaKey {
    pub fn question(question: QuestionId) -> Self {
        Self {
            question,
            answer: None,
        }
    }

    pub fn answer(question: QuestionId, answer: impl Into<String>) -> Self {
        Self {
            question,
            answer: Some(answer.into()),
        }
    }

    pub fn kind(&self) -> LookupKind {
        if self.answer.is_some() {
            LookupKind::Answer
        } else {
            LookupKind::Question
        }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.answer {
            Some(answer) => write!(f, "{} (answer {answer})", self.question),
            None => write!(f, "{}", self.question),
        }
    }
}

/// A lookup the browser layer has to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub key: MediaKey,
    pub nonce: String,
    pub quiz_id: Option<String>,
}

impl LookupRequest {
    pub fn kind(&self) -> LookupKind {
        self.key.kind()
    }

    /// Form-encoded POST body fields, in send order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("action", self.kind().action().to_string()),
            ("question_id", self.key.question.to_string()),
        ];

        if let Some(answer) = &self.key.answer {
            fields.push(("answer_id", answer.clone()));
        }
        fields.push(("nonce", self.nonce.clone()));

        if let Some(index) = self.key.question.synthetic_index() {
            fields.push(("question_index", index.to_string()));
            if let Some(quiz_id) = &self.quiz_id {
                fields.push(("quiz_id", quiz_id.clone()));
            }
        }

        fields
    }
}

/// Reads a lookup response body.
///
/// `Ok(None)` means the server answered but has nothing usable to show.
///
/// # Errors
/// [`SidebarError::InvalidResponse`] when the body is not JSON or the
/// descriptor has the wrong shape.
pub fn parse_lookup_response(body: &str) -> Result<Option<MediaDescriptor>, SidebarError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|error| SidebarError::InvalidResponse {
            reason: error.to_string(),
        })?;

    let success = value
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if !success {
        return Ok(None);
    }

    let Some(data) = value.get("data").filter(|data| !data.is_null()) else {
        return Ok(None);
    };
    let media = data.get("media").unwrap_or(data);
    if media.is_null() {
        return Ok(None);
    }

    let descriptor: MediaDescriptor =
        serde_json::from_value(media.clone()).map_err(|error| SidebarError::InvalidResponse {
            reason: error.to_string(),
        })?;
    let descriptor = descriptor.normalized();

    Ok(descriptor.is_renderable().then_some(descriptor))
}

/// Where the shown media came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Server,
    ConfiguredFallback,
    QuestionImage,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaResolution {
    Render {
        descriptor: MediaDescriptor,
        source: MediaSource,
    },
    /// The answer lookup came back empty; ask again for the whole question.
    Requery(LookupRequest),
    /// A lookup for the same key is already outstanding.
    Pending,
    Discarded(SidebarError),
}

/// Tracks outstanding lookups and decides what each completion shows.
#[derive(Debug)]
pub struct MediaClient {
    nonce: String,
    quiz_id: Option<String>,
    fallback_image: Option<String>,
    placeholder: String,
    in_flight: HashSet<MediaKey>,
    latest: Option<MediaKey>,
}

impl MediaClient {
    pub fn new(config: &SidebarConfig) -> Self {
        Self {
            nonce: config.nonce.clone(),
            quiz_id: config.quiz_id.clone(),
            fallback_image: config.fallback_image().map(str::to_string),
            placeholder: config.placeholder_url.clone(),
            in_flight: HashSet::new(),
            latest: None,
        }
    }

    /// Starts a lookup, or returns `None` when the same key is already
    /// outstanding.
    pub fn fetch(&mut self, key: MediaKey) -> Option<LookupRequest> {
        self.latest = Some(key.clone());

        if !self.in_flight.insert(key.clone()) {
            tracing::debug!(key = %key, "media lookup already in flight");
            return None;
        }

        Some(LookupRequest {
            key,
            nonce: self.nonce.clone(),
            quiz_id: self.quiz_id.clone(),
        })
    }

    /// Settles a lookup against the question that is active now.
    pub fn complete(
        &mut self,
        key: &MediaKey,
        result: Result<Option<MediaDescriptor>, SidebarError>,
        active: Option<&QuestionId>,
        question_image: Option<&ImageRef>,
    ) -> MediaResolution {
        self.in_flight.remove(key);

        if active != Some(&key.question) {
            return MediaResolution::Discarded(SidebarError::StaleResponse {
                requested: key.question.clone(),
                active: active.map_or_else(|| "no question".to_string(), ToString::to_string),
            });
        }

        if let Some(latest) = self.latest.as_ref().filter(|latest| *latest != key) {
            return MediaResolution::Discarded(SidebarError::StaleResponse {
                requested: key.question.clone(),
                active: latest.to_string(),
            });
        }

        let failure = match result {
            Ok(Some(descriptor)) => {
                return MediaResolution::Render {
                    descriptor,
                    source: MediaSource::Server,
                };
            }
            Ok(None) => None,
            Err(error) => Some(error),
        };

        if let Some(error) = &failure {
            tracing::warn!(key = %key, "{error}");
        }

        if key.answer.is_some() {
            tracing::debug!(key = %key, "no answer media, asking for question media");
            return match self.fetch(MediaKey::question(key.question.clone())) {
                Some(request) => MediaResolution::Requery(request),
                None => MediaResolution::Pending,
            };
        }

        let (descriptor, source) = self.fallback(question_image);
        MediaResolution::Render { descriptor, source }
    }

    /// Configured fallback image, then the question's own first image, then
    /// the placeholder.
    pub fn fallback(&self, question_image: Option<&ImageRef>) -> (MediaDescriptor, MediaSource) {
        if let Some(url) = &self.fallback_image {
            return (
                MediaDescriptor::image(url.clone(), Some(FALLBACK_ALT.to_string())),
                MediaSource::ConfiguredFallback,
            );
        }

        if let Some(image) = question_image.filter(|image| !image.src.trim().is_empty()) {
            return (
                MediaDescriptor::image(
                    image.src.clone(),
                    image.alt.clone().or_else(|| Some(FALLBACK_ALT.to_string())),
                ),
                MediaSource::QuestionImage,
            );
        }

        (
            MediaDescriptor::image(self.placeholder.clone(), Some(FALLBACK_ALT.to_string())),
            MediaSource::Placeholder,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(fallback: Option<&str>) -> MediaClient {
        MediaClient::new(&SidebarConfig {
            nonce: "n0nce".to_string(),
            quiz_id: Some("17".to_string()),
            fallback_image_url: fallback.map(str::to_string),
            ..SidebarConfig::default()
        })
    }

    #[test]
    fn extracts_youtube_ids() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(youtube_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), id);
        assert_eq!(youtube_id_from_url("https://youtu.be/dQw4w9WgXcQ?t=10"), id);
        assert_eq!(youtube_id_from_url("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(
            youtube_id_from_url("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            id
        );
        assert_eq!(youtube_id_from_url("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(youtube_id_from_url("https://example.org/video.mp4"), None);
    }

    #[test]
    fn extracts_vimeo_ids() {
        assert_eq!(vimeo_id_from_url("https://vimeo.com/76979871").as_deref(), Some("76979871"));
        assert_eq!(
            vimeo_id_from_url("https://player.vimeo.com/video/123?h=abc").as_deref(),
            Some("123")
        );
        assert_eq!(vimeo_id_from_url("https://vimeo.com/channels"), None);
    }

    #[test]
    fn parses_wrapped_and_bare_descriptors() {
        let wrapped = r#"{"success": true, "data": {"media": {"type": "image", "url": "/a.png", "alt": "A"}}}"#;
        assert_eq!(
            parse_lookup_response(wrapped).expect("valid body"),
            Some(MediaDescriptor::image("/a.png", Some("A".to_string())))
        );

        let bare = r#"{"success": true, "data": {"type": "video", "url": "https://youtu.be/dQw4w9WgXcQ"}}"#;
        let descriptor = parse_lookup_response(bare)
            .expect("valid body")
            .expect("renderable");
        assert_eq!(descriptor.youtube_id(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn unsuccessful_or_empty_responses_yield_nothing() {
        assert_eq!(parse_lookup_response(r#"{"success": false}"#), Ok(None));
        assert_eq!(parse_lookup_response(r#"{"success": true, "data": null}"#), Ok(None));
        assert_eq!(
            parse_lookup_response(r#"{"success": true, "data": {"media": {"type": "image", "url": ""}}}"#),
            Ok(None)
        );
        assert_eq!(
            parse_lookup_response(r#"{"success": true, "data": {"media": {"type": "none"}}}"#),
            Ok(None)
        );
        assert!(matches!(
            parse_lookup_response("<html>"),
            Err(SidebarError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn form_fields_for_synthetic_answer_lookup() {
        let mut client = client(None);
        let request = client
            .fetch(MediaKey::answer(QuestionId::synthetic(2), "4"))
            .expect("first lookup is sent");

        assert_eq!(
            request.form_fields(),
            vec![
                ("action", "get_answer_specific_media".to_string()),
                ("question_id", "q3".to_string()),
                ("answer_id", "4".to_string()),
                ("nonce", "n0nce".to_string()),
                ("question_index", "2".to_string()),
                ("quiz_id", "17".to_string()),
            ]
        );
    }

    #[test]
    fn coalesces_outstanding_keys() {
        let mut client = client(None);
        let key = MediaKey::question(QuestionId::from("42"));

        assert!(client.fetch(key.clone()).is_some());
        assert!(client.fetch(key.clone()).is_none());

        let active = QuestionId::from("42");
        client.complete(&key, Ok(None), Some(&active), None);
        assert!(client.fetch(key).is_some());
    }

    #[test]
    fn failure_uses_configured_fallback_first() {
        let mut client = client(Some("https://example.org/fallback.png"));
        let key = MediaKey::question(QuestionId::from("42"));
        client.fetch(key.clone());

        let image = ImageRef {
            src: "/inline.png".to_string(),
            alt: None,
        };
        let resolution = client.complete(&key, Ok(None), Some(&key.question), Some(&image));

        assert_eq!(
            resolution,
            MediaResolution::Render {
                descriptor: MediaDescriptor::image(
                    "https://example.org/fallback.png",
                    Some(FALLBACK_ALT.to_string())
                ),
                source: MediaSource::ConfiguredFallback,
            }
        );
    }

    #[test]
    fn fallback_tiers_without_configured_image() {
        let client = client(Some(""));
        let image = ImageRef {
            src: "/inline.png".to_string(),
            alt: Some("Diagram".to_string()),
        };

        let (descriptor, source) = client.fallback(Some(&image));
        assert_eq!(source, MediaSource::QuestionImage);
        assert_eq!(descriptor.alt.as_deref(), Some("Diagram"));

        let (descriptor, source) = client.fallback(None);
        assert_eq!(source, MediaSource::Placeholder);
        assert_eq!(descriptor.url(), Some(crate::config::DEFAULT_PLACEHOLDER_URL));
    }

    #[test]
    fn empty_answer_lookup_requeries_question() {
        let mut client = client(None);
        let question = QuestionId::from("42");
        let key = MediaKey::answer(question.clone(), "3");
        client.fetch(key.clone());

        let resolution = client.complete(
            &key,
            Err(SidebarError::FetchFailed {
                reason: "500".to_string(),
            }),
            Some(&question),
            None,
        );

        match resolution {
            MediaResolution::Requery(request) => {
                assert_eq!(request.kind(), LookupKind::Question);
                assert_eq!(request.key, MediaKey::question(question));
            }
            other => panic!("expected a question-level requery, got {other:?}"),
        }
    }

    #[test]
    fn responses_for_other_questions_are_discarded() {
        let mut client = client(None);
        let first = MediaKey::question(QuestionId::from("A"));
        let second = MediaKey::question(QuestionId::from("B"));
        client.fetch(first.clone());
        client.fetch(second.clone());

        let resolution = client.complete(
            &first,
            Ok(Some(MediaDescriptor::image("/a.png", None))),
            Some(&second.question),
            None,
        );
        assert!(matches!(
            resolution,
            MediaResolution::Discarded(SidebarError::StaleResponse { .. })
        ));
    }

    #[test]
    fn superseded_answer_lookup_is_discarded() {
        let mut client = client(None);
        let question = QuestionId::from("42");
        let older = MediaKey::answer(question.clone(), "1");
        let newer = MediaKey::answer(question.clone(), "2");
        client.fetch(older.clone());
        client.fetch(newer.clone());

        let resolution = client.complete(
            &older,
            Ok(Some(MediaDescriptor::image("/one.png", None))),
            Some(&question),
            None,
        );
        assert!(matches!(resolution, MediaResolution::Discarded(_)));

        let resolution = client.complete(
            &newer,
            Ok(Some(MediaDescriptor::image("/two.png", None))),
            Some(&question),
            None,
        );
        assert!(matches!(
            resolution,
            MediaResolution::Render {
                source: MediaSource::Server,
                ..
            }
        ));
    }
}
