//! Tool broker collaborator boundary
//!
//! Fire-and-wait calls against named tool servers. Most tool use happens
//! inside the LLM gateway's internal loop; this contract exists for the
//! few direct invocations (document parsing, sandboxed computation).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Errors raised by the tool broker
#[derive(Debug, thiserror::Error)]
pub enum ToolBrokerError {
    #[error("tool server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("tool call timed out after {0:?}")]
    ToolTimeout(Duration),

    #[error("tool error: {0}")]
    ToolError(String),
}

impl From<ToolBrokerError> for crate::errors::AgentError {
    fn from(err: ToolBrokerError) -> Self {
        match err {
            ToolBrokerError::ToolTimeout(d) => {
                crate::errors::AgentError::Timeout(format!("tool call after {:?}", d))
            }
            other => crate::errors::AgentError::ToolFailed(other.to_string()),
        }
    }
}

/// One tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub server_id: String,
    pub tool_name: String,
    pub arguments: Value,
    /// Wall-clock budget for the call (seconds)
    pub timeout_secs: u64,
}

/// Outcome of a tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: String,
    pub data: Value,
    pub tool: String,
    pub server: String,
}

/// The tool broker collaborator
#[async_trait]
pub trait ToolBroker: Send + Sync {
    /// Execute one tool call to completion
    async fn call(&self, invocation: &ToolInvocation) -> Result<ToolOutcome, ToolBrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{classify, AgentError, ErrorLevel};

    #[test]
    fn test_broker_errors_classify_as_l1() {
        let err: AgentError = ToolBrokerError::ServerUnavailable("mcp-web-search".to_string()).into();
        assert_eq!(classify(&err).level, ErrorLevel::L1Recoverable);

        let err: AgentError = ToolBrokerError::ToolTimeout(Duration::from_secs(30)).into();
        assert_eq!(classify(&err).code, "TIMEOUT");

        let err: AgentError = ToolBrokerError::ToolError("bad arguments".to_string()).into();
        assert_eq!(classify(&err).code, "TOOL_FAILED");
    }

    #[test]
    fn test_invocation_roundtrip() {
        let invocation = ToolInvocation {
            server_id: "sandbox-fusion".to_string(),
            tool_name: "code_execute".to_string(),
            arguments: serde_json::json!({"code": "print(1)"}),
            timeout_secs: 60,
        };
        let json = serde_json::to_string(&invocation).unwrap();
        let parsed: ToolInvocation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tool_name, "code_execute");
    }
}
