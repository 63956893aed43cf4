//! HTTP client for the contract API. Used by the engine as its
//! [`RemoteTransport`] for live requests and replays alike.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use uuid::Uuid;

use fieldkit_core::sync::{ActionPayload, HttpMethod, RemoteResponse, RemoteTransport, TransportError};

use crate::error::{RemoteError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct ContractApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ContractApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Create a client for the API at `base_url` (e.g. "https://api.example.com").
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string())
            .map_err(|_| RemoteError::invalid_request("Invalid request id"))?;
        headers.insert(REQUEST_ID_HEADER, request_id);

        Ok(headers)
    }

    /// Absolute URLs are used as-is; paths are resolved against the base URL.
    fn resolve_url(&self, target: &str) -> Result<String> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Ok(target.to_string());
        }
        if target.starts_with('/') {
            return Ok(format!("{}{}", self.base_url, target));
        }
        Err(RemoteError::invalid_request(format!(
            "Target '{}' is neither an absolute URL nor a path",
            target
        )))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    /// Issue `payload` once. Any HTTP response is `Ok`, whatever its status;
    /// `Err` means the request never produced a response.
    pub async fn execute(&self, payload: &ActionPayload) -> Result<RemoteResponse> {
        let url = self.resolve_url(&payload.target_url)?;
        let mut request = self
            .client
            .request(Self::method(payload.method), &url)
            .headers(self.headers()?);
        if let Some(body) = &payload.body {
            request = request.body(serde_json::to_vec(body)?);
        }

        debug!("{} {}", payload.method, url);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Self::log_response(status, &text);

        Ok(RemoteResponse::new(status.as_u16(), parse_body(&text)))
    }

    /// GET `target` and require a 2xx JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, target: &str) -> Result<T> {
        let response = self.execute(&ActionPayload::get(target)).await?;
        if !response.is_success() {
            let message = response
                .body
                .map(|body| body.to_string())
                .unwrap_or_else(|| "Request failed".to_string());
            return Err(RemoteError::api(response.status, message));
        }
        let body = response
            .body
            .ok_or_else(|| RemoteError::api(response.status, "Empty response body"))?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Empty bodies become `None`; non-JSON text is kept as a JSON string.
fn parse_body(text: &str) -> Option<serde_json::Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
    )
}

#[async_trait]
impl RemoteTransport for ContractApiClient {
    async fn send(
        &self,
        payload: &ActionPayload,
    ) -> std::result::Result<RemoteResponse, TransportError> {
        self.execute(payload).await.map_err(TransportError::from)
    }
}
