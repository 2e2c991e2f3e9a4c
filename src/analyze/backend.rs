// src/analyze/backend.rs
//! Inference backend abstraction and the chat-completions implementation shared by
//! OpenRouter and OpenAI-compatible endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::config::{Credential, ProviderCfg};

/// Why a single (model, credential) attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Model not available on this credential.
    NotFound,
    RateLimited,
    /// Quota, credit or billing problem on the credential.
    QuotaExhausted,
    /// Network error, timeout or unexpected status.
    Transport,
    /// Response arrived but did not contain a usable JSON object.
    Parse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Transport => "transport_error",
            Self::Parse => "parse_error",
        }
    }

    /// Whether the same credential may succeed if asked again later.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport | Self::Parse)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct InferenceFailure {
    pub kind: FailureKind,
    pub retriable: bool,
    pub detail: String,
}

impl InferenceFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            retriable: kind.retriable(),
            detail: detail.into(),
        }
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, detail)
    }
}

/// One analysis request. `deep` selects the longer Pass-2 timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub user: String,
    pub json_mode: bool,
    pub deep: bool,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Provider family name (`openrouter`, `openai`, ...).
    fn name(&self) -> &str;

    /// Submit `prompt` to `model` with `credential`. On success the value is a JSON object.
    async fn submit(
        &self,
        model: &str,
        credential: &Credential,
        prompt: &Prompt,
    ) -> Result<Value, InferenceFailure>;
}

/// `/chat/completions` client. Sends HTTP-Referer / X-Title when configured (OpenRouter
/// uses them for attribution, other providers ignore them).
pub struct ChatCompletionsBackend {
    name: String,
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
    deep_timeout: Duration,
    app_name: Option<String>,
    site_url: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn from_config(cfg: &ProviderCfg) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-impact-alerts/0.1")
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let timeout = Duration::from_secs(cfg.timeout_secs);
        Ok(Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
            deep_timeout: cfg
                .deep_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(timeout),
            app_name: cfg.app_name.clone(),
            site_url: cfg.site_url.clone(),
        })
    }

    fn headers(&self, credential: &Credential) -> Result<HeaderMap, InferenceFailure> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.secret))
            .map_err(|_| InferenceFailure::transport("credential is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(url) = self.site_url.as_deref() {
            if let Ok(v) = HeaderValue::from_str(url) {
                headers.insert("HTTP-Referer", v);
            }
        }
        if let Some(name) = self.app_name.as_deref() {
            if let Ok(v) = HeaderValue::from_str(name) {
                headers.insert("X-Title", v);
            }
        }
        Ok(headers)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        model: &str,
        credential: &Credential,
        prompt: &Prompt,
    ) -> Result<Value, InferenceFailure> {
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt.user,
            }],
            response_format: prompt.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let timeout = if prompt.deep {
            self.deep_timeout
        } else {
            self.timeout
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers(credential)?)
            .timeout(timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() { "timeout" } else { "request failed" };
                InferenceFailure::transport(format!("{what}: {}", without_url(&e)))
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| InferenceFailure::transport(format!("body read: {}", without_url(&e))))?;

        if !status.is_success() {
            let kind = classify_status(status, &body);
            return Err(InferenceFailure::new(
                kind,
                format!("HTTP {}: {}", status.as_u16(), snippet(&body, 160)),
            ));
        }
        parse_completion(&body)
    }
}

/// Map a non-success status (plus body hints) onto a failure kind.
pub fn classify_status(status: StatusCode, body: &str) -> FailureKind {
    match status.as_u16() {
        404 => FailureKind::NotFound,
        429 => FailureKind::RateLimited,
        402 | 403 => FailureKind::QuotaExhausted,
        _ => {
            let lower = body.to_ascii_lowercase();
            if ["quota", "credit", "billing"].iter().any(|w| lower.contains(w)) {
                FailureKind::QuotaExhausted
            } else {
                FailureKind::Transport
            }
        }
    }
}

/// Extract the first choice's content and decode it as a JSON object.
pub fn parse_completion(body: &str) -> Result<Value, InferenceFailure> {
    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceFailure::parse(format!("completion envelope: {e}")))?;
    let content = resp
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .ok_or_else(|| InferenceFailure::parse(format!("no choices in response: {}", snippet(body, 120))))?;
    parse_json_object(&content)
}

/// Lenient: strips code fences, then falls back to the outermost `{...}` span.
pub fn parse_json_object(content: &str) -> Result<Value, InferenceFailure> {
    let cleaned = strip_code_blocks(content);
    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => v,
        Err(first) => match (cleaned.find('{'), cleaned.rfind('}')) {
            (Some(a), Some(b)) if a < b => serde_json::from_str(&cleaned[a..=b])
                .map_err(|_| InferenceFailure::parse(format!("model output is not JSON: {first}")))?,
            _ => return Err(InferenceFailure::parse(format!("model output is not JSON: {first}"))),
        },
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(InferenceFailure::parse("model output is not a JSON object"))
    }
}

pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn snippet(s: &str, max: usize) -> String {
    let one_line = s.split_whitespace().collect::<Vec<_>>().join(" ");
    one_line.chars().take(max).collect()
}

/// reqwest errors embed the URL; keep logs free of query strings.
fn without_url(e: &reqwest::Error) -> String {
    let mut s = e.to_string();
    if let Some(url) = e.url() {
        s = s.replace(url.as_str(), "<url>");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), FailureKind::NotFound);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "insufficient credits"),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::PAYMENT_REQUIRED, ""),
            FailureKind::QuotaExhausted
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "You exceeded your current quota"),
            FailureKind::QuotaExhausted
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            FailureKind::Transport
        );
    }

    #[test]
    fn completion_with_fenced_json() {
        let body = json!({
            "choices": [{"message": {"content": "```json\n{\"impact\": \"no impact\"}\n```"}}]
        })
        .to_string();
        assert_eq!(parse_completion(&body).unwrap(), json!({"impact": "no impact"}));
    }

    #[test]
    fn completion_with_prose_around_object() {
        let v = parse_json_object("Sure! {\"probability\": 70} Hope it helps").unwrap();
        assert_eq!(v["probability"], json!(70));
    }

    #[test]
    fn missing_choices_is_parse_failure() {
        let err = parse_completion(r#"{"error": {"message": "x"}}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
        assert!(err.retriable);
    }

    #[test]
    fn non_object_is_parse_failure() {
        assert_eq!(
            parse_json_object("[1,2]").unwrap_err().kind,
            FailureKind::Parse
        );
    }

    #[test]
    fn quota_and_not_found_are_not_retriable() {
        assert!(!InferenceFailure::new(FailureKind::QuotaExhausted, "").retriable);
        assert!(!InferenceFailure::new(FailureKind::NotFound, "").retriable);
    }
}
