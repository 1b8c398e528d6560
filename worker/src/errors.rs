//! Error classification
//!
//! The classifier is the single place that decides severity. Every error an
//! agent raises maps to one of three levels:
//!
//! - L1 recoverable: retried by the activity runtime
//! - L2 intervention: bounded retries, then surfaced (defaults or DLQ)
//! - L3 fatal: no retry; the Saga runs and the workflow aborts
//!
//! Workflow code observes activity failures as strings from the event log,
//! so each classified error carries a stable code token at the front of the
//! message; [`classify_message`] recovers the classification from it.

use biovalue_engine::EngineError;
use serde_json::{json, Map, Value};

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorLevel {
    /// Recoverable - automatic retry
    L1Recoverable = 1,
    /// Requires human intervention
    L2Intervention = 2,
    /// Fatal - circuit trip, alert, abort
    L3Fatal = 3,
}

impl std::fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorLevel::L1Recoverable => "L1_RECOVERABLE",
            ErrorLevel::L2Intervention => "L2_INTERVENTION",
            ErrorLevel::L3Fatal => "L3_FATAL",
        };
        f.write_str(s)
    }
}

/// Errors raised by agent activities and their collaborators
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("cache service unavailable: {0}")]
    CacheUnavailable(String),

    #[error("LLM service unavailable: {0}")]
    LlmUnavailable(String),

    #[error("tool execution failed: {0}")]
    ToolFailed(String),

    #[error("data validation failed: {0}")]
    ValidationFailed(String),

    #[error("LLM output verification failed: {0}")]
    Hallucination(String),

    #[error("business rule violation: {0}")]
    BusinessRule(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("{0}")]
    Unknown(String),
}

/// An error with its severity classification and retry policy fields
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub level: ErrorLevel,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    pub max_retries: u32,
    pub metadata: Map<String, Value>,
}

impl ClassifiedError {
    fn new(
        level: ErrorLevel,
        code: &'static str,
        message: String,
        retryable: bool,
        max_retries: u32,
    ) -> Self {
        Self {
            level,
            code,
            message,
            retryable,
            max_retries,
            metadata: Map::new(),
        }
    }

    fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Whether this classification requires a human review flag downstream
    pub fn requires_human_review(&self) -> bool {
        self.metadata
            .get("require_human_review")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Convert into the engine error the activity returns. The code token
    /// leads the message so the workflow side can re-classify from the
    /// event log.
    pub fn into_engine_error(self) -> EngineError {
        let message = format!("{}: {}", self.code, self.message);
        if self.retryable {
            EngineError::ActivityFailed(message)
        } else {
            EngineError::NonRetryable(message)
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.code, self.message)
    }
}

/// Classify an agent error into its severity level and policy fields
pub fn classify(error: &AgentError) -> ClassifiedError {
    match error {
        AgentError::Timeout(msg) => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "TIMEOUT",
            msg.clone(),
            true,
            3,
        ),

        AgentError::RateLimited => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "RATE_LIMITED",
            "Rate limit exceeded".to_string(),
            true,
            5,
        )
        .with_metadata("backoff", json!("exponential")),

        AgentError::CacheUnavailable(msg) => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "CACHE_UNAVAILABLE",
            msg.clone(),
            true,
            3,
        ),

        AgentError::LlmUnavailable(msg) => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "LLM_UNAVAILABLE",
            msg.clone(),
            true,
            3,
        )
        .with_metadata("try_fallback", json!(true)),

        AgentError::ToolFailed(msg) => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "TOOL_FAILED",
            msg.clone(),
            true,
            2,
        ),

        AgentError::ValidationFailed(msg) => ClassifiedError::new(
            ErrorLevel::L2Intervention,
            "VALIDATION_FAILED",
            msg.clone(),
            false,
            0,
        ),

        AgentError::Hallucination(msg) => ClassifiedError::new(
            ErrorLevel::L2Intervention,
            "LLM_HALLUCINATION",
            msg.clone(),
            false,
            2,
        )
        .with_metadata("require_human_review", json!(true)),

        AgentError::BusinessRule(msg) => ClassifiedError::new(
            ErrorLevel::L2Intervention,
            "BUSINESS_RULE",
            msg.clone(),
            false,
            0,
        ),

        AgentError::ConfigInvalid(msg) => ClassifiedError::new(
            ErrorLevel::L3Fatal,
            "FATAL_CONFIG",
            msg.clone(),
            false,
            0,
        ),

        AgentError::AuthFailed => ClassifiedError::new(
            ErrorLevel::L3Fatal,
            "AUTH_FAILED",
            "Authentication failed".to_string(),
            false,
            0,
        ),

        AgentError::DataCorruption(msg) => ClassifiedError::new(
            ErrorLevel::L3Fatal,
            "DATA_CORRUPTION",
            msg.clone(),
            false,
            0,
        ),

        AgentError::Unknown(msg) => ClassifiedError::new(
            ErrorLevel::L1Recoverable,
            "UNKNOWN",
            msg.clone(),
            true,
            1,
        ),
    }
}

/// Recover a classification from an error message carrying a code token.
/// Messages without a known token classify as UNKNOWN (L1).
pub fn classify_message(message: &str) -> ClassifiedError {
    const CODES: &[(&str, fn(&str) -> AgentError)] = &[
        ("FATAL_CONFIG", |m| AgentError::ConfigInvalid(m.to_string())),
        ("AUTH_FAILED", |_| AgentError::AuthFailed),
        ("DATA_CORRUPTION", |m| {
            AgentError::DataCorruption(m.to_string())
        }),
        ("VALIDATION_FAILED", |m| {
            AgentError::ValidationFailed(m.to_string())
        }),
        ("LLM_HALLUCINATION", |m| {
            AgentError::Hallucination(m.to_string())
        }),
        ("BUSINESS_RULE", |m| AgentError::BusinessRule(m.to_string())),
        ("RATE_LIMITED", |_| AgentError::RateLimited),
        ("LLM_UNAVAILABLE", |m| {
            AgentError::LlmUnavailable(m.to_string())
        }),
        ("CACHE_UNAVAILABLE", |m| {
            AgentError::CacheUnavailable(m.to_string())
        }),
        ("TOOL_FAILED", |m| AgentError::ToolFailed(m.to_string())),
        ("TIMEOUT", |m| AgentError::Timeout(m.to_string())),
    ];

    for (code, make) in CODES {
        if message.contains(code) {
            return classify(&make(message));
        }
    }
    classify(&AgentError::Unknown(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(ErrorLevel::L1Recoverable < ErrorLevel::L2Intervention);
        assert!(ErrorLevel::L2Intervention < ErrorLevel::L3Fatal);
        assert_eq!(ErrorLevel::L2Intervention.to_string(), "L2_INTERVENTION");
    }

    #[test]
    fn test_l1_classifications() {
        let c = classify(&AgentError::Timeout("slow".to_string()));
        assert_eq!(c.level, ErrorLevel::L1Recoverable);
        assert_eq!(c.code, "TIMEOUT");
        assert!(c.retryable);
        assert_eq!(c.max_retries, 3);

        let c = classify(&AgentError::RateLimited);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.metadata.get("backoff"), Some(&json!("exponential")));

        let c = classify(&AgentError::LlmUnavailable("503".to_string()));
        assert_eq!(c.metadata.get("try_fallback"), Some(&json!(true)));

        let c = classify(&AgentError::Unknown("weird".to_string()));
        assert_eq!(c.level, ErrorLevel::L1Recoverable);
        assert_eq!(c.max_retries, 1);
    }

    #[test]
    fn test_l2_classifications() {
        let c = classify(&AgentError::ValidationFailed("pos out of range".to_string()));
        assert_eq!(c.level, ErrorLevel::L2Intervention);
        assert!(!c.retryable);

        let c = classify(&AgentError::Hallucination("schema mismatch".to_string()));
        assert_eq!(c.level, ErrorLevel::L2Intervention);
        assert!(c.requires_human_review());
        assert_eq!(c.max_retries, 2);
    }

    #[test]
    fn test_l3_classifications() {
        for error in [
            AgentError::ConfigInvalid("bad wacc range".to_string()),
            AgentError::AuthFailed,
            AgentError::DataCorruption("checksum".to_string()),
        ] {
            let c = classify(&error);
            assert_eq!(c.level, ErrorLevel::L3Fatal);
            assert!(!c.retryable);
            assert_eq!(c.max_retries, 0);
        }
    }

    #[test]
    fn test_into_engine_error_carries_code() {
        let err = classify(&AgentError::LlmUnavailable("503".to_string())).into_engine_error();
        assert!(matches!(err, EngineError::ActivityFailed(_)));
        assert!(err.to_string().contains("LLM_UNAVAILABLE"));

        let err = classify(&AgentError::ConfigInvalid("bad".to_string())).into_engine_error();
        assert!(matches!(err, EngineError::NonRetryable(_)));
        assert!(err.to_string().contains("FATAL_CONFIG"));
    }

    #[test]
    fn test_classify_message_roundtrip() {
        let original = classify(&AgentError::ConfigInvalid("bad bounds".to_string()));
        let message = original.clone().into_engine_error().to_string();

        let recovered = classify_message(&message);
        assert_eq!(recovered.level, ErrorLevel::L3Fatal);
        assert_eq!(recovered.code, "FATAL_CONFIG");

        let recovered = classify_message("Activity failed: LLM_HALLUCINATION: not json");
        assert_eq!(recovered.level, ErrorLevel::L2Intervention);

        let recovered = classify_message("some unlabelled explosion");
        assert_eq!(recovered.level, ErrorLevel::L1Recoverable);
        assert_eq!(recovered.code, "UNKNOWN");
    }
}
