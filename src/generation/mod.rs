//! Text generation - external summarization calls
//!
//! The summarize/hybrid chunking strategies delegate condensation to an
//! external text-generation provider. Only the thin client lives here; what
//! the model does with the prompt is not this crate's concern.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{floor_char_boundary, get_api_key};

/// Gemini generation endpoint
/// source: https://ai.google.dev/gemini-api/docs/text-generation
const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Input cap for summarization prompts.
const MAX_PROMPT_SOURCE_CHARS: usize = 12_000;

// ============================================================================
// TextGenerator Trait
// ============================================================================

/// Interface to an external text -> text provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name (for logs).
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini Generator
// ============================================================================

/// Gemini text-generation client.
#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { api_key, client })
    }

    /// Create from the environment, or `None` when no credential is set.
    pub fn from_env() -> Option<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key).ok()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
}

#[derive(Debug, Serialize)]
struct GenerateContent {
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Serialize)]
struct GeneratePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(GEMINI_GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generation request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read generation response body")?;

        if !status.is_success() {
            anyhow::bail!("Generation provider error ({}): {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generation response")?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("Generation provider returned an empty candidate");
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini-2.0-flash"
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Build the summarization prompt for a document, capping the source text.
pub fn summary_prompt(title: &str, text: &str) -> String {
    let capped = if text.chars().count() > MAX_PROMPT_SOURCE_CHARS {
        let byte_end = text
            .char_indices()
            .nth(MAX_PROMPT_SOURCE_CHARS)
            .map(|(i, _)| i)
            .unwrap_or_else(|| floor_char_boundary(text, text.len()));
        &text[..byte_end]
    } else {
        text
    };

    format!(
        "Summarize the following legal document in at most 300 words. \
         Preserve concrete figures, deadlines, and statutory references. \
         Respond with the summary only.\n\nTitle: {}\n\n{}",
        title, capped
    )
}

// ============================================================================
// Tests
// ============================================================================
