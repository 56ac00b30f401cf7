//! REST client for the Grange marketplace chat endpoints.
//!
//! Conversation and message list responses are returned as raw
//! [`serde_json::Value`]s on purpose: the backend serves several wrappings of
//! the same data and field names vary by role, so canonicalization belongs to
//! the consumer, not the transport. This crate owns paths, bearer auth,
//! timeouts and the retry policy.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REQUEST_ATTEMPTS: u32 = 3;

/// Base delay between GET retries; attempt `n` waits `n` times this.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Which path family to use. Admin console sessions read through the
/// `/admin` prefix; buyers and sellers use the plain paths. The payload
/// shape contract is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    User,
    Admin,
}

impl ChatScope {
    fn prefix(self) -> &'static str {
        match self {
            ChatScope::User => "",
            ChatScope::Admin => "/admin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_attempts: u32,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    request_attempts: u32,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api_base_url_missing")]
    BaseUrlMissing,
    #[error("api_invalid_path")]
    InvalidPath,
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_unauthorized")]
    Unauthorized,
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct TypingBody {
    is_typing: bool,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn conversations_path(
        scope: ChatScope,
        unread_only: bool,
        context_type: Option<&str>,
    ) -> String {
        let mut path = format!("{}/conversations", scope.prefix());
        let mut sep = '?';
        if unread_only {
            path.push(sep);
            path.push_str("unread_only=true");
            sep = '&';
        }
        if let Some(context) = context_type {
            path.push(sep);
            path.push_str("context_type=");
            path.push_str(context.trim());
        }
        path
    }

    #[must_use]
    pub fn messages_path(scope: ChatScope, conversation_id: u64) -> String {
        format!("{}/conversations/{conversation_id}/messages", scope.prefix())
    }

    #[must_use]
    pub fn typing_path(conversation_id: u64) -> String {
        format!("/conversations/{conversation_id}/typing")
    }

    #[must_use]
    pub fn unread_count_path() -> &'static str {
        "/messages/unread-count"
    }

    /// `GET /conversations` (or the admin variant) with optional server-side
    /// filters. Returns the raw body; the wrapping varies by deployment.
    pub async fn fetch_conversations(
        &self,
        token: Option<&str>,
        scope: ChatScope,
        unread_only: bool,
        context_type: Option<&str>,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json(
            Self::conversations_path(scope, unread_only, context_type).as_str(),
            token,
        )
        .await
    }

    /// `GET /conversations/{id}/messages` (or the admin variant), raw body.
    pub async fn fetch_messages(
        &self,
        token: Option<&str>,
        scope: ChatScope,
        conversation_id: u64,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json(Self::messages_path(scope, conversation_id).as_str(), token)
            .await
    }

    /// `POST /conversations/{id}/messages` with `{"message": text}`. The
    /// created-message body is not consumed; callers re-fetch the thread.
    /// Exactly one attempt: message delivery is never retried silently.
    pub async fn send_message(
        &self,
        token: Option<&str>,
        scope: ChatScope,
        conversation_id: u64,
        text: &str,
    ) -> Result<(), ApiError> {
        self.post_ignore_body(
            Self::messages_path(scope, conversation_id).as_str(),
            token,
            &SendMessageBody { message: text },
        )
        .await
    }

    /// `POST /conversations/{id}/typing` with `{"is_typing": flag}`.
    /// Best-effort by contract; single attempt, response ignored.
    pub async fn notify_typing(
        &self,
        token: Option<&str>,
        conversation_id: u64,
        is_typing: bool,
    ) -> Result<(), ApiError> {
        self.post_ignore_body(
            Self::typing_path(conversation_id).as_str(),
            token,
            &TypingBody { is_typing },
        )
        .await
    }

    /// `GET /messages/unread-count`, raw scalar-ish body.
    pub async fn fetch_unread_count(
        &self,
        token: Option<&str>,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json(Self::unread_count_path(), token).await
    }

    pub async fn get_json<T>(&self, path: &str, token: Option<&str>) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send_get(path, token).await?;
        decode_json_response(response).await
    }

    async fn post_ignore_body<Req>(
        &self,
        path: &str,
        token: Option<&str>,
        payload: &Req,
    ) -> Result<(), ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut request = self
            .http
            .post(url.as_str())
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout)
            .json(payload);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| ApiError::Request {
            message: error.to_string(),
        })?;
        check_status(response).await.map(|_| ())
    }

    async fn send_get(&self, path: &str, token: Option<&str>) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let mut request = self
                .http
                .get(url.as_str())
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                    tokio::time::sleep(RETRY_BACKOFF * (attempt + 1)).await;
                }
            }
        }

        Err(ApiError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ApiError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Success → the body bytes; error status → the mapped `ApiError`.
async fn check_status(response: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| ApiError::Read {
        message: error.to_string(),
    })?;
    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }
    Ok(bytes.to_vec())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let bytes = check_status(response).await?;
    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
