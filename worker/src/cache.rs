//! Cache / idempotency layer
//!
//! The cache is what makes every expensive activity effectively idempotent:
//! keys are deterministic per `(ticker, kind [, drug])`, values are JSON
//! artifacts, TTLs are per namespace. Re-running with the same key within
//! TTL returns byte-identical content. The store itself is an external
//! collaborator behind [`CacheStore`]; the in-memory backend serves the
//! worker binary and tests.

use crate::errors::AgentError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Result type for cache operations
pub type CacheResult<T> = Result<T, AgentError>;

/// An entry appended to a cache stream (used by the DLQ)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Monotonic entry id within the stream
    pub id: u64,
    /// Entry payload
    pub fields: serde_json::Value,
}

/// Key/value cache store with TTLs and append-only streams.
///
/// Operations mirror the store's wire surface: GET, SET with TTL, DELETE,
/// EXISTS, SETNX, TTL, EXPIRE, plus stream append/read used by the DLQ.
/// Reads and writes are individually atomic; no multi-key transactions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value. Returns None on a missing or expired key.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Set a value only if the key does not exist. Returns whether the
    /// write won. Losers of a single-flight race poll the result key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remaining TTL of a key.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Reset the TTL of a key.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Append an entry to a stream, returning its id.
    async fn stream_append(&self, stream: &str, fields: serde_json::Value) -> CacheResult<u64>;

    /// Read all entries of a stream.
    async fn stream_read_all(&self, stream: &str) -> CacheResult<Vec<StreamEntry>>;

    /// Length of a stream.
    async fn stream_len(&self, stream: &str) -> CacheResult<u64>;
}

/// In-memory cache backend with TTL bookkeeping.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Option<Instant>)>>,
    streams: RwLock<HashMap<String, Vec<StreamEntry>>>,
}

impl InMemoryCacheStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        let (value, deadline) = entries.get(key)?;
        if let Some(deadline) = deadline {
            if Instant::now() >= *deadline {
                return None;
            }
        }
        Some(value.clone())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.write().insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await?;
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let entries = self.entries.read();
        Ok(entries.get(key).and_then(|(_, deadline)| {
            deadline.and_then(|d| d.checked_duration_since(Instant::now()))
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some((_, deadline)) => {
                *deadline = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stream_append(&self, stream: &str, fields: serde_json::Value) -> CacheResult<u64> {
        let mut streams = self.streams.write();
        let entries = streams.entry(stream.to_string()).or_default();
        let id = entries.len() as u64 + 1;
        entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    async fn stream_read_all(&self, stream: &str) -> CacheResult<Vec<StreamEntry>> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .cloned()
            .unwrap_or_default())
    }

    async fn stream_len(&self, stream: &str) -> CacheResult<u64> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }
}

/// Per-namespace TTLs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTtls {
    /// Financials namespace (seconds)
    pub financials_secs: u64,
    /// Raw pipeline scan namespace (seconds)
    pub pipeline_secs: u64,
    /// Per-drug clinical namespace (seconds)
    pub clinical_secs: u64,
    /// Per-drug market namespace (seconds)
    pub market_secs: u64,
    /// Final report namespace (seconds)
    pub report_secs: u64,
    /// Freshness window for the pipeline scan's data_as_of override
    pub pipeline_freshness_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            financials_secs: 24 * 3600,
            pipeline_secs: 24 * 3600,
            clinical_secs: 12 * 3600,
            market_secs: 6 * 3600,
            report_secs: 7 * 24 * 3600,
            pipeline_freshness_secs: 24 * 3600,
        }
    }
}

impl CacheTtls {
    pub fn financials(&self) -> Duration {
        Duration::from_secs(self.financials_secs)
    }
    pub fn pipeline(&self) -> Duration {
        Duration::from_secs(self.pipeline_secs)
    }
    pub fn clinical(&self) -> Duration {
        Duration::from_secs(self.clinical_secs)
    }
    pub fn market(&self) -> Duration {
        Duration::from_secs(self.market_secs)
    }
    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_secs)
    }
    pub fn pipeline_freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pipeline_freshness_secs as i64)
    }
}

/// Deterministic cache key schema
pub struct CacheKeys;

impl CacheKeys {
    pub fn financials(ticker: &str) -> String {
        format!("company:{}:financials", ticker)
    }

    pub fn pipeline_raw(ticker: &str) -> String {
        format!("company:{}:pipeline:raw", ticker)
    }

    pub fn clinical(ticker: &str, drug: &str) -> String {
        format!("company:{}:pipeline:{}:clinical", ticker, drug)
    }

    pub fn market(ticker: &str, drug: &str) -> String {
        format!("company:{}:pipeline:{}:market", ticker, drug)
    }

    pub fn report(ticker: &str) -> String {
        format!("company:{}:report:final", ticker)
    }

    /// Prefix of a namespace for compensation cleanup
    pub fn namespace_prefix(ticker: &str, namespace: &str) -> String {
        match namespace {
            "financials" => Self::financials(ticker),
            "pipeline" => format!("company:{}:pipeline", ticker),
            "report" => Self::report(ticker),
            other => format!("company:{}:{}", ticker, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = InMemoryCacheStore::new();
        store
            .set("company:BGNE:financials", "{\"x\":1}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("company:BGNE:financials").await.unwrap(),
            Some("{\"x\":1}".to_string())
        );
        assert!(store.exists("company:BGNE:financials").await.unwrap());
        assert!(!store.exists("company:BGNE:report:final").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", "v", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryCacheStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_single_flight() {
        let store = InMemoryCacheStore::new();
        assert!(store
            .set_nx("lease", "worker-1", Duration::from_secs(30))
            .await
            .unwrap());
        // Second producer loses the race
        assert!(!store
            .set_nx("lease", "worker-2", Duration::from_secs(30))
            .await
            .unwrap());
        assert_eq!(store.get("lease").await.unwrap(), Some("worker-1".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_and_expire() {
        let store = InMemoryCacheStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        let remaining = store.ttl("k").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60));

        assert!(store.expire("k", Duration::from_secs(600)).await.unwrap());
        let extended = store.ttl("k").await.unwrap().unwrap();
        assert!(extended > Duration::from_secs(60));

        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_append_and_read() {
        let store = InMemoryCacheStore::new();
        let id1 = store
            .stream_append("biovalue:dlq", json!({"activity": "clinical-assessor"}))
            .await
            .unwrap();
        let id2 = store
            .stream_append("biovalue:dlq", json!({"activity": "market-strategist"}))
            .await
            .unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);

        assert_eq!(store.stream_len("biovalue:dlq").await.unwrap(), 2);
        let entries = store.stream_read_all("biovalue:dlq").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields["activity"], "clinical-assessor");

        assert_eq!(store.stream_len("empty").await.unwrap(), 0);
    }

    #[test]
    fn test_key_schema() {
        assert_eq!(CacheKeys::financials("BGNE"), "company:BGNE:financials");
        assert_eq!(CacheKeys::pipeline_raw("BGNE"), "company:BGNE:pipeline:raw");
        assert_eq!(
            CacheKeys::clinical("BGNE", "DrugA"),
            "company:BGNE:pipeline:DrugA:clinical"
        );
        assert_eq!(
            CacheKeys::market("BGNE", "DrugA"),
            "company:BGNE:pipeline:DrugA:market"
        );
        assert_eq!(CacheKeys::report("BGNE"), "company:BGNE:report:final");
    }

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.financials(), Duration::from_secs(86400));
        assert_eq!(ttls.clinical(), Duration::from_secs(43200));
        assert_eq!(ttls.market(), Duration::from_secs(21600));
        assert_eq!(ttls.report(), Duration::from_secs(604800));
    }
}
