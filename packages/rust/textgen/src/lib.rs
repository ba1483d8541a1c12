//! Text-service gateway.
//!
//! Wraps a single chat-completion call behind a resilient client: bounded
//! exponential-backoff retry on transient status codes, answer extraction
//! from the first choice, and conversion of every transport or shape fault
//! into a structured [`Completion`] — callers branch on
//! [`Completion::is_success`] and never see a raw error.

mod parse;
mod prompts;

use std::time::{Duration, Instant};

use feedloom_shared::{FeedloomError, Result, TextgenConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub use parse::{EnrichedPayload, extract_json_object, parse_enrichment};
pub use prompts::{CONTENT_PARSE_PROMPT, TAG_AGGREGATE_PROMPT};

/// Status codes worth retrying: server errors, rate limit, payload too large.
const RETRYABLE_STATUS: &[u16] = &[500, 502, 503, 504, 429, 413];

/// Per-request timeout for completion calls.
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Outcome of a completion call. Never an `Err` — faults are carried inline.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Transport status code; 0 when the request never got a response.
    pub status_code: u16,
    /// First-choice message content. Empty on failure.
    pub answer: String,
    /// Populated whenever `is_success()` is false.
    pub error: Option<String>,
    /// Wall-clock duration of the call including retries.
    pub elapsed_ms: u64,
}

impl Completion {
    /// True iff the transport returned 200 and the answer is non-empty.
    pub fn is_success(&self) -> bool {
        self.status_code == 200 && !self.answer.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Resilient client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct Gateway {
    client: Client,
    base_url: String,
    token: String,
    max_attempts: u32,
    backoff_base_ms: u64,
}

impl Gateway {
    /// Create a gateway against `base_url` (e.g. `https://api.example.com/v1`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedloomError::Textgen(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            max_attempts: 3,
            backoff_base_ms: 1000,
        })
    }

    /// Create a gateway from config, reading the API key from its env var.
    pub fn from_config(cfg: &TextgenConfig) -> Result<Self> {
        let token = std::env::var(&cfg.api_key_env).unwrap_or_default();
        Ok(Self::new(cfg.base_url.clone(), token)?
            .with_retry(cfg.max_attempts, cfg.backoff_base_ms))
    }

    /// Override the retry policy (attempts include the first try).
    pub fn with_retry(mut self, max_attempts: u32, backoff_base_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Run one completion call. Transient failures are retried with
    /// exponential backoff; everything else is reported in the result.
    #[instrument(skip_all, fields(model))]
    pub async fn complete(&self, model: &str, text: &str, system_prompt: &str) -> Completion {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            // o1-family models reject the system role; send as user instead.
            let role = if model.starts_with("o1") { "user" } else { "system" };
            messages.push(ChatMessage {
                role,
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });

        let request = ChatRequest { model, messages };
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let sent = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&request)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if RETRYABLE_STATUS.contains(&status) && attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        warn!(status, attempt, ?delay, "transient completion failure, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return self.finish(status, &body, started);
                }
                Err(e) => {
                    if attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        warn!(error = %e, attempt, ?delay, "completion request failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Completion {
                        status_code: 0,
                        answer: String::new(),
                        error: Some(e.to_string()),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    };
                }
            }
        }
    }

    /// Build the final [`Completion`] from a settled HTTP exchange.
    fn finish(&self, status: u16, body: &str, started: Instant) -> Completion {
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let answer = serde_json::from_str::<ChatResponse>(body)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if status == 200 && !answer.is_empty() {
            debug!(elapsed_ms, answer_len = answer.len(), "completion succeeded");
            return Completion {
                status_code: status,
                answer,
                error: None,
                elapsed_ms,
            };
        }

        // A 200 with an empty answer is a failure too: the caller has
        // nothing to work with either way.
        let error = if status == 200 {
            "empty completion answer".to_string()
        } else if body.is_empty() {
            format!("HTTP {status}")
        } else {
            let detail: String = body.chars().take(200).collect();
            format!("HTTP {status}: {detail}")
        };

        Completion {
            status_code: status,
            answer: String::new(),
            error: Some(error),
            elapsed_ms,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms << (attempt - 1).min(8))
    }
}
