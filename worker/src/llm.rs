//! LLM inference collaborator boundary
//!
//! The gateway executes the request end to end, including any internal
//! tool loop; the worker only sees the structured answer. Backpressure is
//! applied on this side of the boundary: a token-bucket rate limit on
//! requests and tokens per minute, and a per-provider circuit breaker.

use crate::errors::AgentError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A tool exposed to the gateway's internal tool loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub mcp_server: String,
}

/// Inference request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferRequest {
    pub trace_id: String,
    pub agent_id: String,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub enable_tools: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// Status of an inference response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    ToolRequired,
    ValidationFailed,
    RateLimited,
    Error,
}

/// Intermediate reasoning exposed by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thought {
    pub reasoning: String,
    pub plan: String,
    pub confidence: f64,
}

/// A tool call requested by the model (informational; the loop is internal
/// to the gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    pub input_json: String,
    pub server: String,
}

/// Token usage and cost accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub model: String,
    pub latency_ms: u64,
}

/// Inference response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<Thought>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallInfo>,
    pub final_answer: String,
    #[serde(default)]
    pub usage: Usage,
}

/// The LLM inference collaborator
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one inference request to a structured answer
    async fn infer(&self, request: &InferRequest) -> Result<InferResponse, AgentError>;
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Per-minute rate limit settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 90_000,
        }
    }
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(per_minute: u32) -> Self {
        Self {
            capacity: per_minute as f64,
            tokens: per_minute as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }

    /// Try to take `amount`; on shortfall, the wait needed to cover it
    fn take(&mut self, amount: f64) -> Option<Duration> {
        self.refill();
        if self.tokens >= amount {
            self.tokens -= amount;
            None
        } else {
            let missing = amount - self.tokens;
            Some(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Token-bucket rate limiter over requests/min and tokens/min
pub struct RateLimiter {
    requests: Mutex<Bucket>,
    tokens: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            requests: Mutex::new(Bucket::new(settings.requests_per_minute)),
            tokens: Mutex::new(Bucket::new(settings.tokens_per_minute)),
        }
    }

    /// Wait until one request with the estimated token cost may proceed
    pub async fn acquire(&self, estimated_tokens: u32) {
        loop {
            let wait = {
                let mut requests = self.requests.lock();
                match requests.take(1.0) {
                    None => {
                        let mut tokens = self.tokens.lock();
                        match tokens.take(estimated_tokens as f64) {
                            None => return,
                            Some(wait) => {
                                // Give the request token back; retry as a unit
                                requests.tokens = (requests.tokens + 1.0).min(requests.capacity);
                                wait
                            }
                        }
                    }
                    Some(wait) => wait,
                }
            };
            tokio::time::sleep(wait.min(Duration::from_secs(1))).await;
        }
    }
}

// ============================================================================
// Circuit breaking
// ============================================================================

/// Circuit breaker settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe
    pub reset_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Closed / open / half-open circuit breaker per external provider.
/// Open-circuit rejections classify as L1 with exponential backoff.
pub struct CircuitBreaker {
    settings: CircuitSettings,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(settings: CircuitSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, advancing open → half-open after the reset window
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= Duration::from_secs(self.settings.reset_secs) {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
        inner.state
    }

    /// Whether a call may proceed
    pub fn allow(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.settings.failure_threshold
        {
            if inner.state != CircuitState::Open {
                warn!(
                    failures = inner.consecutive_failures,
                    "Circuit opened for LLM provider"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

// ============================================================================
// Gated client
// ============================================================================

/// Wraps a provider client with rate limiting, circuit breaking and the
/// configured fallback provider. The fallback is consulted when the
/// classified error carries the try_fallback hint.
pub struct GatedLlmClient {
    primary: Arc<dyn LlmClient>,
    fallback: Option<Arc<dyn LlmClient>>,
    limiter: RateLimiter,
    circuit: CircuitBreaker,
}

impl GatedLlmClient {
    pub fn new(
        primary: Arc<dyn LlmClient>,
        fallback: Option<Arc<dyn LlmClient>>,
        rate_limit: RateLimitSettings,
        circuit: CircuitSettings,
    ) -> Self {
        Self {
            primary,
            fallback,
            limiter: RateLimiter::new(rate_limit),
            circuit: CircuitBreaker::new(circuit),
        }
    }

    fn estimated_tokens(request: &InferRequest) -> u32 {
        // Coarse upper bound: prompt bytes / 3 plus the completion budget
        let prompt_len = request.system_prompt.len() + request.user_prompt.len();
        (prompt_len as u32 / 3) + request.max_tokens.unwrap_or(2048)
    }
}

#[async_trait]
impl LlmClient for GatedLlmClient {
    async fn infer(&self, request: &InferRequest) -> Result<InferResponse, AgentError> {
        if !self.circuit.allow() {
            return Err(AgentError::LlmUnavailable(
                "circuit open for primary provider".to_string(),
            ));
        }

        self.limiter.acquire(Self::estimated_tokens(request)).await;

        match self.primary.infer(request).await {
            Ok(response) if response.status == ResponseStatus::RateLimited => {
                self.circuit.on_failure();
                Err(AgentError::RateLimited)
            }
            Ok(response) => {
                self.circuit.on_success();
                Ok(response)
            }
            Err(e) => {
                self.circuit.on_failure();
                let classified = crate::errors::classify(&e);
                let try_fallback = classified
                    .metadata
                    .get("try_fallback")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if try_fallback {
                    if let Some(fallback) = &self.fallback {
                        info!(agent_id = %request.agent_id, "Primary provider failed, trying fallback");
                        return fallback.infer(request).await;
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubClient {
        calls: AtomicU32,
        failures_before_success: u32,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn infer(&self, _request: &InferRequest) -> Result<InferResponse, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(AgentError::LlmUnavailable("503".to_string()))
            } else {
                Ok(InferResponse {
                    status: ResponseStatus::Success,
                    thought: None,
                    tool_call: None,
                    final_answer: "{}".to_string(),
                    usage: Usage::default(),
                })
            }
        }
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let breaker = CircuitBreaker::new(CircuitSettings {
            failure_threshold: 3,
            reset_secs: 60,
        });

        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.on_failure();
        breaker.on_failure();
        assert!(breaker.allow());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_circuit_half_open_after_reset() {
        let breaker = CircuitBreaker::new(CircuitSettings {
            failure_threshold: 1,
            reset_secs: 0,
        });

        breaker.on_failure();
        // Reset window elapsed immediately: probe allowed
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow());

        // Failed probe re-opens
        breaker.on_failure();
        assert!(!matches!(breaker.state(), CircuitState::Closed));

        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_within_budget() {
        let limiter = RateLimiter::new(RateLimitSettings {
            requests_per_minute: 600,
            tokens_per_minute: 600_000,
        });
        // Plenty of budget: must not block
        tokio::time::timeout(Duration::from_millis(100), limiter.acquire(100))
            .await
            .expect("acquire should not block");
    }

    #[tokio::test]
    async fn test_gated_client_uses_fallback() {
        let primary = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            failures_before_success: u32::MAX,
        });
        let fallback = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            failures_before_success: 0,
        });

        let gated = GatedLlmClient::new(
            primary.clone(),
            Some(fallback.clone()),
            RateLimitSettings::default(),
            CircuitSettings::default(),
        );

        let response = gated.infer(&InferRequest::default()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gated_client_rejects_when_circuit_open() {
        let primary = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            failures_before_success: u32::MAX,
        });
        let gated = GatedLlmClient::new(
            primary.clone(),
            None,
            RateLimitSettings::default(),
            CircuitSettings {
                failure_threshold: 1,
                reset_secs: 3600,
            },
        );

        let _ = gated.infer(&InferRequest::default()).await;
        let err = gated.infer(&InferRequest::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmUnavailable(_)));
        // The second call never reached the provider
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_response_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ResponseStatus::ToolRequired).unwrap(),
            "\"TOOL_REQUIRED\""
        );
    }
}
