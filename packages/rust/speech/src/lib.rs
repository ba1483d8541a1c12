//! Speech synthesis capability for the narration stage.
//!
//! The pipeline depends on the [`SpeechSynthesizer`] trait; the service
//! itself is a black box that turns text into an audio reference.
//! [`HttpSpeechClient`] posts to the configured synthesis endpoint.
//!
//! Voice tokens are a closed set — an unknown token is a caller-side
//! validation error and is never forwarded to the service.

use std::time::Duration;

use feedloom_shared::{FeedloomError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Per-request timeout; synthesis of a long article can take a while.
const SYNTHESIS_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Accepted synthesis voices (language/gender variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Voice {
    #[default]
    ZhFemale,
    ZhMale,
    EnFemale,
    EnMale,
    JaMale,
    YueFemale,
    KoFemale,
}

impl Voice {
    /// Wire token sent to the synthesis service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZhFemale => "zh-female",
            Self::ZhMale => "zh-male",
            Self::EnFemale => "en-female",
            Self::EnMale => "en-male",
            Self::JaMale => "ja-male",
            Self::YueFemale => "yue-female",
            Self::KoFemale => "ko-female",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Voice {
    type Err = FeedloomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zh-female" => Ok(Self::ZhFemale),
            "zh-male" => Ok(Self::ZhMale),
            "en-female" => Ok(Self::EnFemale),
            "en-male" => Ok(Self::EnMale),
            "ja-male" => Ok(Self::JaMale),
            "yue-female" => Ok(Self::YueFemale),
            "ko-female" => Ok(Self::KoFemale),
            other => Err(FeedloomError::validation(format!(
                "invalid voice '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer
// ---------------------------------------------------------------------------

/// Capability contract: render text to audio, returning an audio reference
/// (URL or path) for storage on the item.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        seed: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// HttpSpeechClient
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'static str,
    seed: u32,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    audio_url: String,
}

/// HTTP client for the speech synthesis service.
pub struct HttpSpeechClient {
    client: Client,
    endpoint: String,
}

impl HttpSpeechClient {
    /// Create a client against the service base endpoint.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SYNTHESIS_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedloomError::Speech(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl SpeechSynthesizer for HttpSpeechClient {
    #[instrument(skip(self, text), fields(voice = %voice, text_len = text.len()))]
    async fn synthesize(&self, text: &str, voice: Voice, seed: u32) -> Result<String> {
        if text.is_empty() {
            return Err(FeedloomError::validation("synthesis text is empty"));
        }

        let url = format!("{}/generate_audio", self.endpoint.trim_end_matches('/'));
        let request = SynthesizeRequest {
            text,
            voice: voice.as_str(),
            seed,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedloomError::Speech(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedloomError::Speech(format!("{url}: HTTP {status}")));
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| FeedloomError::Speech(format!("invalid synthesis response: {e}")))?;

        debug!(audio = %body.audio_url, "synthesis complete");
        Ok(body.audio_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_token_roundtrip() {
        for voice in [
            Voice::ZhFemale,
            Voice::ZhMale,
            Voice::EnFemale,
            Voice::EnMale,
            Voice::JaMale,
            Voice::YueFemale,
            Voice::KoFemale,
        ] {
            let parsed: Voice = voice.as_str().parse().expect("parse voice");
            assert_eq!(parsed, voice);
        }
    }

    #[test]
    fn invalid_voice_is_validation_error() {
        let result = "klingon-male".parse::<Voice>();
        assert!(matches!(result, Err(FeedloomError::Validation { .. })));
    }

    #[tokio::test]
    async fn empty_text_rejected_before_any_request() {
        // Endpoint is never contacted: port 1 would fail loudly if it were.
        let client = HttpSpeechClient::new("http://127.0.0.1:1").expect("client");
        let result = client.synthesize("", Voice::ZhFemale, 0).await;
        assert!(matches!(result, Err(FeedloomError::Validation { .. })));
    }

    #[tokio::test]
    async fn synthesize_returns_audio_reference() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/generate_audio"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"audio_url": "/static/audio/abc123.mp3"}),
            ))
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let audio = client
            .synthesize("hello world", Voice::EnFemale, 0)
            .await
            .expect("synthesize");
        assert_eq!(audio, "/static/audio/abc123.mp3");
    }

    #[tokio::test]
    async fn service_error_surfaces_as_speech_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/generate_audio"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let result = client.synthesize("hello", Voice::ZhFemale, 0).await;
        assert!(matches!(result, Err(FeedloomError::Speech(_))));
    }
}
