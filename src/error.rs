use crate::tracker::QuestionId;

/// Failures inside the sidebar and hint enforcement logic.
///
/// None of these are fatal. Discovery ambiguity and poll timeouts leave the
/// question ungated, fetch failures fall through the media fallback tiers and
/// stale responses are dropped.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SidebarError {
    #[error("could not determine the correct answer for question {question}: {reason}")]
    DiscoveryAmbiguous { question: QuestionId, reason: String },
    #[error("no answer result appeared after {attempts} checks ({waited_ms}ms)")]
    PollTimeout { attempts: u32, waited_ms: u32 },
    #[error("media lookup failed: {reason}")]
    FetchFailed { reason: String },
    #[error("media lookup returned an unusable payload: {reason}")]
    InvalidResponse { reason: String },
    #[error("media response for question {requested} arrived after switching to {active}")]
    StaleResponse { requested: QuestionId, active: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse sidebar settings: {reason}")]
    Parse { reason: String },
    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,
    #[error("poll timeout of {timeout_ms}ms is shorter than the {interval_ms}ms interval")]
    PollTimeoutTooShort { interval_ms: u32, timeout_ms: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_context() {
        let error = SidebarError::StaleResponse {
            requested: QuestionId::from("42"),
            active: "q3".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "media response for question 42 arrived after switching to q3"
        );

        let error = ConfigError::PollTimeoutTooShort {
            interval_ms: 100,
            timeout_ms: 50,
        };
        assert!(error.to_string().contains("50ms"));
    }
}
