//! Dead-letter queue over the cache store's stream surface
//!
//! Terminally failed activity inputs land here with their trace context
//! for human follow-up. Overflow above the configured threshold raises an
//! alert but never stops the workflow.

use crate::cache::CacheStore;
use crate::errors::AgentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Default DLQ stream name
pub const DEFAULT_STREAM: &str = "biovalue:dlq";

/// One dead-lettered activity failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub workflow_id: String,
    pub activity_name: String,
    pub error: String,
    pub input_json: String,
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    #[serde(default)]
    pub trace_context: String,
}

/// Dead-letter queue handle
pub struct DeadLetterQueue {
    cache: Arc<dyn CacheStore>,
    stream: String,
    alert_threshold: u64,
}

impl DeadLetterQueue {
    pub fn new(cache: Arc<dyn CacheStore>, stream: &str, alert_threshold: u64) -> Self {
        Self {
            cache,
            stream: stream.to_string(),
            alert_threshold,
        }
    }

    /// Enqueue a terminally failed activity input
    pub async fn enqueue(&self, entry: DeadLetterEntry) -> Result<u64, AgentError> {
        let fields = serde_json::to_value(&entry)
            .map_err(|e| AgentError::Unknown(format!("dlq serialization: {}", e)))?;
        let id = self.cache.stream_append(&self.stream, fields).await?;

        let depth = self.cache.stream_len(&self.stream).await?;
        if depth > self.alert_threshold {
            error!(
                stream = %self.stream,
                depth,
                threshold = self.alert_threshold,
                "DLQ depth above alert threshold"
            );
        }
        Ok(id)
    }

    /// Current queue depth
    pub async fn len(&self) -> Result<u64, AgentError> {
        self.cache.stream_len(&self.stream).await
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> Result<bool, AgentError> {
        Ok(self.len().await? == 0)
    }

    /// Read every entry for inspection
    pub async fn entries(&self) -> Result<Vec<DeadLetterEntry>, AgentError> {
        let raw = self.cache.stream_read_all(&self.stream).await?;
        raw.into_iter()
            .map(|e| {
                serde_json::from_value(e.fields)
                    .map_err(|e| AgentError::Unknown(format!("dlq entry parse: {}", e)))
            })
            .collect()
    }
}
