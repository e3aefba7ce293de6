use crate::config::Config;
use crate::prompt::ChapterRequest;
use crate::{logi, logw};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const GENERATE_PATH: &str = "/api/generate-script";
/// Status the service uses for an exhausted usage ceiling.
pub const QUOTA_STATUS: u16 = 429;
const LOG_SNIPPET_BYTES: usize = 800;

const TOO_SHORT_MARKERS: &[&str] = &["too short", "너무 짧"];

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

/// Output of one successful generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterResult {
    pub script: String,
    pub last_two_sentences: Option<String>,
    pub scene_count: Option<u32>,
}

impl ChapterResult {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Continuation hint from the service, if it sent a non-blank one.
    pub fn hint(&self) -> Option<&str> {
        self.last_two_sentences
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        retry_delay_secs: Option<f64>,
        message: String,
    },
    #[error("response too short: {0}")]
    TooShort(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("service returned an empty script")]
    EmptyScript,
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl GenerationError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    pub fn is_too_short(&self) -> bool {
        matches!(self, Self::TooShort(_))
    }
}

/// One network call to the script generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &ChapterRequest) -> Result<ChapterResult, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    last_two_sentences: Option<String>,
    #[serde(default)]
    scene_count: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default, rename = "retryDelay")]
    retry_delay: Option<f64>,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        if let Some(err) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return Some(err.to_string());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

pub fn mentions_too_short(message: &str) -> bool {
    let lower = message.to_lowercase();
    TOO_SHORT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Maps a non-success response to an error kind. Quota status wins; otherwise a
/// "too short" message marks the retryable case whatever the status.
pub fn classify_failure(status: u16, body: &str) -> GenerationError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message()
        .unwrap_or_else(|| trim_copy_utf8_safe(body.trim(), LOG_SNIPPET_BYTES));

    if status == QUOTA_STATUS {
        return GenerationError::QuotaExceeded {
            retry_delay_secs: parsed.retry_delay,
            message,
        };
    }
    if mentions_too_short(&message) {
        return GenerationError::TooShort(message);
    }
    GenerationError::Http { status, message }
}

/// Parses a 2xx body into a [`ChapterResult`]. A body carrying a "too short"
/// error message is the retryable case here too. A blank or missing `script`
/// is returned as-is; whether that ends the run is the caller's decision.
pub fn parse_success(body: &str) -> Result<ChapterResult, GenerationError> {
    let reported = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message());
    if let Some(message) = reported.filter(|m| mentions_too_short(m)) {
        return Err(GenerationError::TooShort(message));
    }

    let parsed: SuccessBody = serde_json::from_str(body).map_err(|e| {
        if mentions_too_short(body) {
            GenerationError::TooShort(trim_copy_utf8_safe(body.trim(), LOG_SNIPPET_BYTES))
        } else {
            GenerationError::Decode(e.to_string())
        }
    })?;

    let scene_count = parsed
        .scene_count
        .filter(|n| n.is_finite() && *n > 0.0)
        .map(|n| n.round() as u32);

    Ok(ChapterResult {
        script: parsed.script.unwrap_or_default(),
        last_two_sentences: parsed.last_two_sentences,
        scene_count,
    })
}

/// Client for the console backend's script endpoint.
pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", cfg.api_base.trim_end_matches('/'), GENERATE_PATH),
            api_key: cfg.api_key().map(str::to_string),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, request: &ChapterRequest) -> Result<ChapterResult, GenerationError> {
        logi(format!(
            "POST {} (chapter {}/{}, {:.2} min)",
            self.endpoint, request.current_chapter, request.total_chapters, request.target_minutes
        ));

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            logw(format!("Generation HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                logw(format!(
                    "Generation raw body: {}",
                    trim_copy_utf8_safe(&raw, LOG_SNIPPET_BYTES)
                ));
            }
            return Err(classify_failure(status.as_u16(), &raw));
        }

        parse_success(&raw).inspect_err(|_| {
            logw(format!(
                "Generation response parse failed. Raw body: {}",
                trim_copy_utf8_safe(&raw, LOG_SNIPPET_BYTES)
            ));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_status_is_distinct() {
        let err = classify_failure(429, r#"{"error": "quota", "retryDelay": 42.5}"#);
        assert_eq!(
            err,
            GenerationError::QuotaExceeded {
                retry_delay_secs: Some(42.5),
                message: "quota".into()
            }
        );
        assert!(classify_failure(429, "not json").is_quota());
        assert!(!classify_failure(503, r#"{"error": "quota"}"#).is_quota());
    }

    #[test]
    fn test_too_short_any_status() {
        assert!(classify_failure(500, r#"{"detail": "Generated script is too short"}"#).is_too_short());
        assert!(classify_failure(400, r#"{"error": "대본이 너무 짧습니다"}"#).is_too_short());
    }

    #[test]
    fn test_generic_failure_keeps_message() {
        let err = classify_failure(502, r#"{"detail": {"reason": "upstream"}}"#);
        match err {
            GenerationError::Http { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("upstream"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = classify_failure(500, "  gateway exploded  ");
        assert_eq!(
            err,
            GenerationError::Http {
                status: 500,
                message: "gateway exploded".into()
            }
        );
    }

    #[test]
    fn test_parse_success() {
        let r = parse_success(r#"{"script": "Hello.", "last_two_sentences": "Hi. Hello.", "scene_count": 9.0}"#)
            .unwrap();
        assert_eq!(r.script, "Hello.");
        assert_eq!(r.hint(), Some("Hi. Hello."));
        assert_eq!(r.scene_count, Some(9));

        let r = parse_success(r#"{"script": "Only text.", "last_two_sentences": "  "}"#).unwrap();
        assert_eq!(r.hint(), None);
        assert_eq!(r.scene_count, None);
    }

    #[test]
    fn test_parse_success_too_short_on_2xx() {
        let err = parse_success(r#"{"error": "Generated script is too short"}"#).unwrap_err();
        assert!(err.is_too_short());
        assert!(parse_success(r#"{"script": "", "detail": "대본이 너무 짧습니다"}"#)
            .unwrap_err()
            .is_too_short());
        assert!(parse_success("script too short, try again").unwrap_err().is_too_short());
    }

    #[test]
    fn test_parse_success_empty_script_is_returned() {
        assert_eq!(parse_success(r#"{"script": "   "}"#).unwrap().script, "   ");
        assert_eq!(parse_success("{}").unwrap(), ChapterResult::default());
        // a script that merely talks about length is not an error
        let r = parse_success(r#"{"script": "The day felt too short."}"#).unwrap();
        assert_eq!(r.script, "The day felt too short.");
        assert!(matches!(parse_success("<html>"), Err(GenerationError::Decode(_))));
    }

    #[test]
    fn test_trim_copy_utf8_safe() {
        assert_eq!(trim_copy_utf8_safe("abc", 10), "abc");
        assert_eq!(trim_copy_utf8_safe("가나다", 4), "가");
    }

    #[test]
    fn test_endpoint_join() {
        let cfg = Config {
            api_base: "http://relay.test/".into(),
            ..Config::default()
        };
        let client = HttpGenerationClient::with_client(Client::new(), &cfg);
        assert_eq!(client.endpoint(), "http://relay.test/api/generate-script");
    }
}
