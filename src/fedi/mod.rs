use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct FediClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl FediClientConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// The posting side of a sync.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Upload one media file; returns the server-assigned media id.
    async fn upload_media(&self, data: Bytes, file_name: &str, mime_type: &str) -> Result<String, FediError>;

    /// Publish a status; returns the new status id.
    async fn publish_status(&self, status: &str, media_ids: &[String]) -> Result<String, FediError>;
}

/// Mastodon-compatible REST client.
#[derive(Clone)]
pub struct MastodonClient {
    http: HttpClient,
    cfg: FediClientConfig,
}

impl MastodonClient {
    pub fn new(cfg: FediClientConfig) -> Result<Self, FediError> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(FediError::from_reqwest)?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn read_id(response: reqwest::Response) -> Result<String, FediError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(FediError::from_reqwest)?;
        decode_id(status, &bytes)
    }
}

/// `id` of a created media/status, or the server's error message.
fn decode_id(status: StatusCode, body: &[u8]) -> Result<String, FediError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
        return Err(FediError::Api { status, message });
    }
    let parsed: IdResponse = serde_json::from_slice(body).map_err(FediError::Decode)?;
    Ok(parsed.id)
}

#[async_trait]
impl Destination for MastodonClient {
    async fn upload_media(&self, data: Bytes, file_name: &str, mime_type: &str) -> Result<String, FediError> {
        let part = multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(FediError::from_reqwest)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint("api/v2/media"))
            .bearer_auth(&self.cfg.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(FediError::from_reqwest)?;
        Self::read_id(response).await
    }

    async fn publish_status(&self, status: &str, media_ids: &[String]) -> Result<String, FediError> {
        let body = StatusRequest { status, media_ids };
        let response = self
            .http
            .post(self.endpoint("api/v1/statuses"))
            .bearer_auth(&self.cfg.access_token)
            .json(&body)
            .send()
            .await
            .map_err(FediError::from_reqwest)?;
        Self::read_id(response).await
    }
}

#[derive(Debug, Error)]
pub enum FediError {
    #[error("http error: {0}")]
    Http(reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("api error {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("decode error: {0}")]
    Decode(serde_json::Error),
}

impl FediError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() { FediError::Timeout } else { FediError::Http(err) }
    }

    /// Whether a retry can plausibly succeed. 4xx other than 408/429 means
    /// the request itself is wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            FediError::Timeout | FediError::Http(_) => true,
            FediError::Api { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            FediError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    status: &'a str,
    media_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}
