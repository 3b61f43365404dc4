use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{env_parse, env_string};
use crate::services::app_config::ConfigResolver;

use super::model::resolve_model_name;

const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const TRANSCRIBE_INSTRUCTION: &str = "Transcribe the attached audio exactly as spoken. \
Return only the transcription text, with no commentary, labels, quotes or translation.";

/// Inline audio sent along with a prompt.
#[derive(Debug, Clone)]
pub struct AudioAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioAttachment {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn format_token(&self) -> &'static str {
        audio_format_for_mime(&self.mime_type)
    }
}

/// Maps a MIME type onto the provider's `input_audio.format` token.
/// Unknown types fall back to `wav`.
pub fn audio_format_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => "mp3",
        "audio/webm" => "webm",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        other => {
            warn!(mime_type = %other, "unrecognized audio MIME type, sending as wav");
            "wav"
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("provider rejected credentials (HTTP {status})")]
    Unauthorized { status: u16, body: String },
    #[error("provider quota or billing exhausted")]
    PaymentRequired { body: String },
    #[error("model not found: {model}")]
    ModelNotFound { model: String, body: String },
    #[error("provider rate limit reached")]
    RateLimited { body: String },
    #[error("provider rejected request: {body}")]
    BadRequest { body: String },
    #[error("provider error HTTP {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider returned no content")]
    EmptyResponse,
    #[error("malformed model output: {0}")]
    Parse(String),
}

impl CompletionError {
    pub fn from_status(status: StatusCode, body: String, model: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized {
                status: status.as_u16(),
                body,
            },
            StatusCode::PAYMENT_REQUIRED => Self::PaymentRequired { body },
            StatusCode::NOT_FOUND => Self::ModelNotFound { model: model.to_string(), body },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { body },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::BadRequest { body },
            _ => Self::Provider { status: status.as_u16(), body },
        }
    }

    /// Short label used in log fields and progress payloads.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::Unauthorized { .. } => "auth",
            Self::PaymentRequired { .. } => "quota",
            Self::ModelNotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limit",
            Self::BadRequest { .. } => "bad_request",
            Self::Provider { .. } => "provider",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::EmptyResponse => "empty",
            Self::Parse(_) => "parse",
        }
    }

    /// Message safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "AI service is not configured",
            Self::Unauthorized { .. } => "AI service rejected the credentials",
            Self::PaymentRequired { .. } => "AI service quota exhausted",
            Self::ModelNotFound { .. } => "Configured AI model was not found",
            Self::RateLimited { .. } => "AI service is busy, please try again later",
            Self::BadRequest { .. } => "AI service rejected the request",
            Self::Parse(_) | Self::EmptyResponse => "AI service returned an unusable answer",
            _ => "AI service is unavailable",
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Transport(_)
            | Self::Timeout(_)
            | Self::EmptyResponse
            | Self::Parse(_) => true,
            Self::Provider { status, .. } => *status == 408 || *status >= 500,
            Self::NotConfigured(_)
            | Self::Unauthorized { .. }
            | Self::PaymentRequired { .. }
            | Self::ModelNotFound { .. }
            | Self::BadRequest { .. } => false,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        audio: Option<&AudioAttachment>,
    ) -> Result<String, CompletionError>;
}

/// Transcribes `audio` with a fixed transcribe-only instruction.
pub async fn transcribe(
    client: &dyn CompletionClient,
    audio: &AudioAttachment,
    source_language: &str,
    user_id: Option<&str>,
) -> Result<String, CompletionError> {
    let prompt = format!("{TRANSCRIBE_INSTRUCTION}\nSpoken language: {source_language}.");
    let text = client.generate(&prompt, user_id, Some(audio)).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CompletionError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[derive(Debug, Clone)]
pub struct HttpCompletionConfig {
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl HttpCompletionConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("LLM_API_KEY"),
            api_endpoint: normalize_endpoint(
                env_string("LLM_API_ENDPOINT")
                    .or_else(|| env_string("LLM_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            ),
            timeout: Duration::from_millis(env_parse("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions backend.
#[derive(Clone)]
pub struct HttpCompletionClient {
    config: HttpCompletionConfig,
    client: reqwest::Client,
    resolver: Arc<dyn ConfigResolver>,
}

impl HttpCompletionClient {
    pub fn new(config: HttpCompletionConfig, resolver: Arc<dyn ConfigResolver>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client, resolver }
    }

    pub fn from_env(resolver: Arc<dyn ConfigResolver>) -> Self {
        Self::new(HttpCompletionConfig::from_env(), resolver)
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.api_endpoint.trim().is_empty()
    }

    fn build_payload(
        model: &str,
        prompt: &str,
        audio: Option<&AudioAttachment>,
    ) -> serde_json::Value {
        let content = match audio {
            None => serde_json::json!(prompt),
            Some(audio) => serde_json::json!([
                { "type": "text", "text": prompt },
                {
                    "type": "input_audio",
                    "input_audio": { "data": audio.base64(), "format": audio.format_token() }
                }
            ]),
        };
        serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "stream": false
        })
    }

    async fn send(
        &self,
        api_key: &str,
        model: &str,
        payload: &serde_json::Value,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let resp = self.client.post(&url).bearer_auth(api_key).json(payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::from_status(status, body, model));
        }

        let bytes = resp.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes).map_err(|e| {
            CompletionError::Parse(format!("provider envelope: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn generate(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        audio: Option<&AudioAttachment>,
    ) -> Result<String, CompletionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(CompletionError::NotConfigured("LLM_API_KEY"))?;

        let model = resolve_model_name(self.resolver.as_ref(), user_id).await;
        let payload = Self::build_payload(&model, prompt, audio);
        debug!(model = %model, has_audio = audio.is_some(), "sending completion request");

        let outcome = match tokio::time::timeout(
            self.config.timeout,
            self.send(api_key, &model, &payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.config.timeout)),
        };

        if let Err(ref err) = outcome {
            error!(
                model = %model,
                user_id = user_id.unwrap_or("-"),
                category = err.category(),
                error = %err,
                "completion request failed"
            );
        }
        outcome
    }
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_provider_status_codes() {
        let err = CompletionError::from_status(StatusCode::UNAUTHORIZED, String::new(), "m");
        assert_eq!(err.category(), "auth");
        let err = CompletionError::from_status(StatusCode::PAYMENT_REQUIRED, String::new(), "m");
        assert_eq!(err.category(), "quota");
        let err = CompletionError::from_status(StatusCode::NOT_FOUND, String::new(), "m");
        assert_eq!(err.category(), "not_found");
        let err = CompletionError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new(), "m");
        assert_eq!(err.category(), "rate_limit");
        let err = CompletionError::from_status(StatusCode::BAD_REQUEST, String::new(), "m");
        assert_eq!(err.category(), "bad_request");
        let err = CompletionError::from_status(StatusCode::BAD_GATEWAY, String::new(), "m");
        assert_eq!(err.category(), "provider");
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let retryable = |status| CompletionError::from_status(status, String::new(), "m").is_retryable();
        assert!(retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable(StatusCode::BAD_GATEWAY));
        assert!(retryable(StatusCode::REQUEST_TIMEOUT));
        assert!(!retryable(StatusCode::UNAUTHORIZED));
        assert!(!retryable(StatusCode::FORBIDDEN));
        assert!(!retryable(StatusCode::PAYMENT_REQUIRED));
        assert!(!retryable(StatusCode::NOT_FOUND));
        assert!(!retryable(StatusCode::BAD_REQUEST));
        assert!(!retryable(StatusCode::CONFLICT));
        assert!(CompletionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn maps_audio_mime_types() {
        assert_eq!(audio_format_for_mime("audio/mpeg"), "mp3");
        assert_eq!(audio_format_for_mime("audio/webm;codecs=opus"), "webm");
        assert_eq!(audio_format_for_mime("AUDIO/WAV"), "wav");
        assert_eq!(audio_format_for_mime("application/octet-stream"), "wav");
    }

    #[test]
    fn audio_payload_is_inline_base64() {
        let audio = AudioAttachment::new(vec![1, 2, 3], "audio/mp3");
        let payload = HttpCompletionClient::build_payload("gpt-4o-mini", "hi", Some(&audio));
        let part = &payload["messages"][0]["content"][1]["input_audio"];
        assert_eq!(part["format"], "mp3");
        assert_eq!(part["data"], "AQID");
    }

    #[test]
    fn endpoint_gets_v1_suffix() {
        assert_eq!(normalize_endpoint("https://x.test/".into()), "https://x.test/v1");
        assert_eq!(normalize_endpoint("https://x.test/v1".into()), "https://x.test/v1");
    }
}
