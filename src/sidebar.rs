//! What the media sidebar shows, independent of how it is drawn.

use crate::media::{MediaDescriptor, MediaKind};

pub const LOADING_CLASS: &str = "loading";
pub const ERROR_CLASS: &str = "error";
pub const IMAGE_CONTENT_CLASS: &str = "question-media-image";
pub const VIDEO_CONTENT_CLASS: &str = "question-media-video";

const YOUTUBE_EMBED_BASE: &str = "https://www.youtube.com/embed/";
const VIMEO_EMBED_BASE: &str = "https://player.vimeo.com/video/";
const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".webm", ".ogg", ".mov"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SidebarView {
    #[default]
    Empty,
    Loading,
    Image {
        src: String,
        alt: String,
    },
    /// Platform player or best-effort iframe.
    Embed {
        src: String,
    },
    /// Raw embed markup supplied by the CMS.
    EmbedCode {
        html: String,
    },
    Video {
        src: String,
    },
    Error,
}

impl SidebarView {
    /// Class set on the sidebar container.
    pub fn container_class(&self) -> Option<&'static str> {
        match self {
            Self::Loading => Some(LOADING_CLASS),
            Self::Error => Some(ERROR_CLASS),
            _ => None,
        }
    }

    /// Class set on the content element.
    pub fn content_class(&self) -> Option<&'static str> {
        match self {
            Self::Image { .. } => Some(IMAGE_CONTENT_CLASS),
            Self::Embed { .. } | Self::EmbedCode { .. } | Self::Video { .. } => {
                Some(VIDEO_CONTENT_CLASS)
            }
            _ => None,
        }
    }
}

/// Whether a URL points at a file a `<video>` element can play directly.
pub fn is_video_file(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|extension| path.ends_with(*extension))
}

/// Maps a descriptor onto a view.
///
/// Videos prefer a platform id, then raw embed code, then a direct file,
/// and finally an iframe on the bare URL. Anything unrenderable is an error.
pub fn render(descriptor: &MediaDescriptor) -> SidebarView {
    match descriptor.kind {
        MediaKind::Image => match descriptor.url() {
            Some(url) => SidebarView::Image {
                src: url.to_string(),
                alt: descriptor.alt.clone().unwrap_or_default(),
            },
            None => SidebarView::Error,
        },
        MediaKind::Video => {
            if let Some(id) = descriptor.youtube_id() {
                SidebarView::Embed {
                    src: format!("{YOUTUBE_EMBED_BASE}{id}"),
                }
            } else if let Some(id) = descriptor.vimeo_id() {
                SidebarView::Embed {
                    src: format!("{VIMEO_EMBED_BASE}{id}"),
                }
            } else if let Some(html) = descriptor.embed_code() {
                SidebarView::EmbedCode {
                    html: html.to_string(),
                }
            } else if let Some(url) = descriptor.url() {
                if is_video_file(url) {
                    SidebarView::Video {
                        src: url.to_string(),
                    }
                } else {
                    SidebarView::Embed {
                        src: url.to_string(),
                    }
                }
            } else {
                SidebarView::Error
            }
        }
        MediaKind::None => SidebarView::Error,
    }
}

/// Current sidebar content.
#[derive(Debug, Default)]
pub struct Sidebar {
    view: SidebarView,
}

impl Sidebar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &SidebarView {
        &self.view
    }

    pub fn begin_loading(&mut self) -> &SidebarView {
        self.view = SidebarView::Loading;
        &self.view
    }

    pub fn show(&mut self, descriptor: &MediaDescriptor) -> &SidebarView {
        self.view = render(descriptor);
        if self.view == SidebarView::Error {
            tracing::warn!(kind = ?descriptor.kind, "media descriptor has nothing to show");
        }
        &self.view
    }

    /// An `<img>` failed to load. Only the image currently shown can flip the
    /// sidebar into the error state; late errors from replaced images are
    /// ignored.
    pub fn image_failed(&mut self, src: &str) -> bool {
        match &self.view {
            SidebarView::Image { src: current, .. } if current == src => {
                tracing::warn!(src, "sidebar image failed to load");
                self.view = SidebarView::Error;
                true
            }
            _ => false,
        }
    }
}
