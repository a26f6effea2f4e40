use crate::error::ConfigError;
use crate::observer::PollConfig;
use crate::policy::HintRequirement;

pub const DEFAULT_PLACEHOLDER_URL: &str = "https://via.placeholder.com/400x300?text=Question+Media";
pub const DEFAULT_HINT_PROMPT: &str = "Wrong answer! You must take a hint to continue.";

/// Per-quiz settings rendered into the page by the CMS.
///
/// Read once at page load and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarConfig {
    /// Endpoint accepting the media lookup POSTs.
    #[serde(default)]
    pub ajax_url: String,
    /// Security token echoed back with every lookup.
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub quiz_id: Option<String>,
    #[serde(default = "enabled")]
    pub sidebar_enabled: bool,
    #[serde(default)]
    pub enforce_hint: bool,
    /// First fallback tier when a lookup yields nothing usable.
    #[serde(default)]
    pub fallback_image_url: Option<String>,
    /// Last fallback tier, used when neither the configured image nor a
    /// question image exists.
    #[serde(default = "placeholder_url")]
    pub placeholder_url: String,
    #[serde(default)]
    pub hint_requirement: HintRequirement,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default = "hint_prompt_text")]
    pub hint_prompt_text: String,
    #[serde(default)]
    pub debug: bool,
}

fn enabled() -> bool {
    true
}

fn placeholder_url() -> String {
    DEFAULT_PLACEHOLDER_URL.to_string()
}

fn hint_prompt_text() -> String {
    DEFAULT_HINT_PROMPT.to_string()
}

impl Default for SidebarConfig {
    fn default() -> Self {
        Self {
            ajax_url: String::new(),
            nonce: String::new(),
            quiz_id: None,
            sidebar_enabled: true,
            enforce_hint: false,
            fallback_image_url: None,
            placeholder_url: placeholder_url(),
            hint_requirement: HintRequirement::default(),
            poll: PollConfig::default(),
            hint_prompt_text: hint_prompt_text(),
            debug: false,
        }
    }
}

impl SidebarConfig {
    /// Parses and validates the settings object.
    ///
    /// # Errors
    /// * [`ConfigError::Parse`] when the payload is not valid settings JSON.
    /// * [`ConfigError::InvalidPollInterval`] / [`ConfigError::PollTimeoutTooShort`]
    ///   when the poll cadence cannot produce a single attempt.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|error| ConfigError::Parse {
            reason: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if self.poll.timeout_ms < self.poll.interval_ms {
            return Err(ConfigError::PollTimeoutTooShort {
                interval_ms: self.poll.interval_ms,
                timeout_ms: self.poll.timeout_ms,
            });
        }

        Ok(())
    }

    /// Empty strings from the CMS mean "no fallback configured".
    pub fn fallback_image(&self) -> Option<&str> {
        self.fallback_image_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}
