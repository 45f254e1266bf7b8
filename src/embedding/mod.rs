//! Embedding module - text vectorization through the Gemini API
//!
//! Two layers live here:
//! - [`EmbeddingProvider`]: the raw provider interface plus the Gemini
//!   implementation (rate limiting, retry, error classification).
//! - [`EmbeddingGateway`]: the size-policy wrapper every caller goes through.
//!   It enforces a character ceiling and a pessimistic token-estimate ceiling
//!   before each call, truncating rather than rejecting oversized input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Embedding failure, classified from the provider's response shape.
///
/// Size/token overflow is never an error: the gateway truncates instead.
/// The cause matters to callers deciding on retry (`RateLimited`, `Timeout`
/// and `Network` are retryable; `AuthFailed` and `BadRequest` are not).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider rate limited the request")]
    RateLimited,
    #[error("embedding provider rejected the credentials")]
    AuthFailed,
    #[error("embedding provider rejected the request: {0}")]
    BadRequest(String),
    #[error("embedding request timed out")]
    Timeout,
    #[error("network error reaching embedding provider: {0}")]
    Network(String),
    #[error("embedding provider failure: {0}")]
    Unknown(String),
}

impl EmbeddingError {
    fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbeddingError::Timeout
        } else {
            EmbeddingError::Network(err.to_string())
        }
    }

    fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => EmbeddingError::RateLimited,
            401 | 403 => EmbeddingError::AuthFailed,
            400 => EmbeddingError::BadRequest(provider_message(body)),
            408 | 504 => EmbeddingError::Timeout,
            _ => EmbeddingError::Unknown(format!("{}: {}", status, provider_message(body))),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited | EmbeddingError::Timeout | EmbeddingError::Network(_)
        )
    }
}

/// Pull the human-readable message out of a Gemini error body, if any.
fn provider_message(body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(err) => err.error.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.len() > 200 {
                format!("{}...", &trimmed[..floor_char_boundary(trimmed, 200)])
            } else {
                trimmed.to_string()
            }
        }
    }
}

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Interface to an external text -> vector provider.
///
/// Implementations are stateless from the caller's point of view: embedding
/// identical text twice yields the same vector up to provider nondeterminism.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Fixed output dimensionality.
    fn dimension(&self) -> usize;

    /// Provider name (for logs).
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Provider
// ============================================================================

/// Gemini embedding endpoint (gemini-embedding-001)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 768;

/// Rate limiter settings (Gemini free tier: 60 RPM).
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY_MS: u64 = 1000;
/// Retry budget for transient failures.
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Gemini embedding implementation.
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Sliding-window rate limiter with a minimum inter-request delay.
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// Wait until a request slot is available.
    async fn acquire(&mut self) {
        // Minimum delay between requests (burst protection)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // Window full: wait for the oldest request to age out
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window - now.duration_since(oldest);
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// Create with the default dimension.
    pub fn new(api_key: String) -> Result<Self, EmbeddingError> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// Create with an explicit dimension (768, 1536 or 3072).
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self, EmbeddingError> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(EmbeddingError::BadRequest(format!(
                "invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EmbeddingError::Unknown(format!("failed to build HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter,
        })
    }

    /// Create from the environment (GEMINI_API_KEY or GOOGLE_AI_API_KEY).
    pub fn from_env() -> Result<Self, EmbeddingError> {
        let api_key = get_api_key().ok_or(EmbeddingError::AuthFailed)?;
        Self::new(api_key)
    }
}

/// Gemini request body
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: Some(self.dimension),
        };

        let mut last_error = EmbeddingError::Unknown("no attempt made".to_string());

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API key goes in a header, not the URL
            let response = match self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = EmbeddingError::from_transport(&e);
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Embedding request failed ({}), retrying in {:?} (attempt {}/{})",
                            last_error,
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| EmbeddingError::Network(format!("failed to read body: {}", e)))?;

            if status.is_success() {
                let embed_response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
                    EmbeddingError::Unknown(format!("unparseable embedding response: {}", e))
                })?;
                return Ok(embed_response.embedding.values);
            }

            last_error = EmbeddingError::from_status(status, &body);

            if last_error.is_retryable() && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Embedding provider error ({}), backing off {:?} (attempt {}/{})",
                    last_error,
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            return Err(last_error);
        }

        Err(last_error)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Embedding Gateway
// ============================================================================

/// Input size ceilings applied before every provider call.
#[derive(Debug, Clone)]
pub struct EmbedLimits {
    /// Absolute character ceiling, independent of content.
    pub max_chars: usize,
    /// Token-estimate ceiling for the target provider.
    pub max_tokens: usize,
    /// Pessimistic chars-per-token divisor. Chosen low so the token estimate
    /// is always >= the true token count and the provider never rejects for
    /// under-estimation.
    pub chars_per_token: usize,
}

impl Default for EmbedLimits {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            max_tokens: 2048,
            chars_per_token: 2,
        }
    }
}

impl EmbedLimits {
    /// Largest character count that passes both ceilings.
    fn effective_max_chars(&self) -> usize {
        self.max_chars.min(self.max_tokens * self.chars_per_token)
    }

    /// Token estimate for a character count: ceil(chars / chars_per_token).
    pub fn estimate_tokens(&self, char_count: usize) -> usize {
        char_count.div_ceil(self.chars_per_token)
    }
}

/// Result of a gateway embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    /// Fixed-length vector from the provider.
    pub vector: Vec<f32>,
    /// True when the input was cut to fit the ceilings.
    pub truncated: bool,
    /// Character count of the text actually sent to the provider.
    pub embedded_chars: usize,
}

/// Size-policy wrapper around an injected [`EmbeddingProvider`].
///
/// Oversized input is truncated, never rejected: partial context beats
/// pipeline failure for a best-effort knowledge assistant. Truncation is
/// recorded in the output, not surfaced as an error. The gateway holds no
/// mutable state; whether one exists at all is the call site's decision
/// (no credential configured means no gateway, see [`EmbeddingGateway::from_env`]).
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    limits: EmbedLimits,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, limits: EmbedLimits) -> Self {
        Self { provider, limits }
    }

    pub fn with_defaults(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(provider, EmbedLimits::default())
    }

    /// Build from the environment, or `None` when no credential is set.
    pub fn from_env() -> Option<Self> {
        if !has_api_key() {
            tracing::info!("No embedding API key configured; semantic search disabled");
            return None;
        }
        match GeminiEmbedding::from_env() {
            Ok(provider) => Some(Self::with_defaults(Arc::new(provider))),
            Err(e) => {
                tracing::warn!("Failed to create embedding provider: {}", e);
                None
            }
        }
    }

    pub fn limits(&self) -> &EmbedLimits {
        &self.limits
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Apply both ceilings. Returns the admissible prefix and whether
    /// anything was cut.
    pub fn fit<'a>(&self, text: &'a str) -> (&'a str, bool) {
        let char_count = text.chars().count();
        let max = self.limits.effective_max_chars();
        if char_count <= max {
            return (text, false);
        }

        let byte_end = text
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        (&text[..byte_end], true)
    }

    /// Embed `text`, truncating to the ceilings first.
    pub async fn embed(&self, text: &str) -> Result<EmbeddedText, EmbeddingError> {
        let (fitted, truncated) = self.fit(text);
        if truncated {
            tracing::debug!(
                provider = self.provider.name(),
                original_chars = text.chars().count(),
                embedded_chars = fitted.chars().count(),
                "Input truncated to embedding ceilings"
            );
        }

        let vector = self.provider.embed(fitted).await?;
        Ok(EmbeddedText {
            vector,
            truncated,
            embedded_chars: fitted.chars().count(),
        })
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Read the provider API key from the environment.
///
/// Priority: `GEMINI_API_KEY`, then `GOOGLE_AI_API_KEY`.
pub fn get_api_key() -> Option<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Some(key);
            }
        }
    }
    None
}

/// Whether any provider credential is configured.
pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Largest valid char boundary <= `index`.
#[inline]
pub(crate) fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

// ============================================================================
// Tests
// ============================================================================
