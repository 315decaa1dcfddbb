//! JSON-RPC 2.0 over HTTP POST
//!
//! Every request is an HTTP POST of one JSON-RPC message to the tool
//! endpoint. The server may reply with:
//!
//! - `application/json` -- the JSON-RPC response as the body
//! - `text/event-stream` -- an SSE body carrying the JSON-RPC response
//! - `202 Accepted` -- an acknowledgement with no body (notifications)
//!
//! # Headers
//!
//! - `MCP-Protocol-Version` on every POST.
//! - `MCP-Session-Id` once the server has issued one (typically on the
//!   `initialize` response). A `404` while a session is active clears it.
//! - `X-API-KEY` when an API key is configured.
//! - `Authorization: Bearer <token>` when the caller attaches a provider
//!   token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use url::Url;

use crate::auth::api::API_KEY_HEADER;
use crate::error::{Result, ToolAuthError};
use crate::transport::{RpcFailure, ToolTransport};
use crate::types::{JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION};

const SESSION_HEADER: &str = "MCP-Session-Id";

/// HTTP transport to the tool endpoint.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use url::Url;
/// use toolauth::transport::http::HttpTransport;
///
/// let transport = HttpTransport::new(
///     Url::parse("http://localhost:3000/mcp").unwrap(),
///     None,
///     Duration::from_secs(30),
/// ).unwrap();
/// assert_eq!(transport.endpoint().path(), "/mcp");
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Http`] if the HTTP client cannot be built.
    pub fn new(endpoint: Url, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ToolAuthError::Http)?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// The tool endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The session id issued by the server, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn post(&self, message: &JsonRpcRequest, bearer: Option<&str>) -> Result<reqwest::Response> {
        let mut req = self
            .http
            .post(self.endpoint.as_str())
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", LATEST_PROTOCOL_VERSION)
            .json(message);

        if let Some(id) = self.session_id.read().await.as_deref() {
            req = req.header(SESSION_HEADER, id);
        }
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolAuthError::Timeout(format!("{} request timed out", message.method))
            } else {
                ToolAuthError::Transport(format!("HTTP POST failed: {e}"))
            }
        })?;

        if let Some(new_session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        {
            let mut sid = self.session_id.write().await;
            if sid.is_none() {
                tracing::debug!("Tool server session established");
                *sid = Some(new_session_id);
            }
        }

        Ok(response)
    }

    async fn reject(&self, response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let mut sid = self.session_id.write().await;
            if sid.take().is_some() {
                tracing::debug!("Tool server session expired");
            }
        }
        let body = response.text().await.unwrap_or_default();
        RpcFailure::from_status(status.as_u16(), &body).into()
    }
}

#[async_trait::async_trait]
impl ToolTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value, bearer: Option<&str>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = JsonRpcRequest::new(id, method, params);
        let response = self.post(&message, bearer).await?;

        if !response.status().is_success() {
            return Err(self.reject(response).await);
        }

        let is_sse = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| ToolAuthError::Transport(format!("failed to read response body: {e}")))?;

        let raw: Value = if is_sse {
            find_sse_response(&body, id).ok_or_else(|| {
                ToolAuthError::Transport(format!("no response for request {id} in event stream"))
            })?
        } else {
            serde_json::from_str(&body).map_err(|e| {
                ToolAuthError::Transport(format!("malformed JSON-RPC response: {e}"))
            })?
        };

        let parsed: JsonRpcResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ToolAuthError::Transport(format!("malformed JSON-RPC response: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(RpcFailure::from_rpc_error(error, Some(raw)).into());
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = JsonRpcRequest::notification(method, params);
        let response = self.post(&message, None).await?;
        if !response.status().is_success() {
            return Err(self.reject(response).await);
        }
        Ok(())
    }

    async fn reset(&self) {
        *self.session_id.write().await = None;
    }
}

/// Finds the JSON-RPC response with `id` in an SSE body.
///
/// Events are separated by blank lines; multi-line `data:` values are joined
/// with `\n`. `ping` events and `[PING]` data are skipped.
fn find_sse_response(body: &str, id: u64) -> Option<Value> {
    let normalized = body.replace("\r\n", "\n");
    for block in normalized.split("\n\n") {
        let mut data_lines = Vec::new();
        let mut is_ping = false;
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.trim());
            } else if let Some(value) = line.strip_prefix("event:") {
                is_ping = value.trim().eq_ignore_ascii_case("ping");
            }
        }

        let data = data_lines.join("\n");
        if is_ping || data.is_empty() || data.eq_ignore_ascii_case("[ping]") {
            continue;
        }

        let Ok(value) = serde_json::from_str::<Value>(&data) else {
            continue;
        };
        if value.get("id").and_then(Value::as_u64) == Some(id) {
            return Some(value);
        }
    }
    None
}
