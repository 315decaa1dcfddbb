//! Tool-server transport abstraction
//!
//! The client treats the tool server as a request/response channel: send a
//! JSON-RPC method with params, optionally with a provider bearer token, and
//! get back the `result` value. Concrete implementations live in submodules:
//!
//! - [`http::HttpTransport`] -- JSON-RPC 2.0 over HTTP POST.
//!
//! Failures reported by the server come back as [`RpcFailure`], which keeps
//! everything the error classifier needs: the HTTP status, the JSON-RPC
//! error object and the raw payload.

pub mod http;

use serde_json::Value;

use crate::error::Result;
use crate::types::JsonRpcError;

/// A request/response channel to the tool server.
#[async_trait::async_trait]
pub trait ToolTransport: Send + Sync + std::fmt::Debug {
    /// Sends `method` with `params` and returns the JSON-RPC `result`.
    ///
    /// `bearer` is attached as `Authorization: Bearer <token>` when set.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFailure`] when the server answers with an HTTP error
    /// or a JSON-RPC error object, and
    /// [`crate::error::ToolAuthError::Transport`] or
    /// [`crate::error::ToolAuthError::Timeout`] when no answer arrives.
    async fn request(&self, method: &str, params: Value, bearer: Option<&str>) -> Result<Value>;

    /// Sends a notification; no result is expected.
    async fn notify(&self, method: &str, params: Value) -> Result<()>;

    /// Forgets any server-side session so the next handshake starts fresh.
    async fn reset(&self) {}
}

/// A failure reported by the tool server.
///
/// # Examples
///
/// ```
/// use toolauth::transport::RpcFailure;
/// use toolauth::types::JsonRpcError;
///
/// let failure = RpcFailure::from_rpc_error(
///     JsonRpcError { code: 401, message: "Unauthorized".to_string(), data: None },
///     None,
/// );
/// assert_eq!(failure.to_string(), "JSON-RPC error 401: Unauthorized");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RpcFailure {
    /// Human-readable description.
    pub message: String,
    /// HTTP status, when the failure came from the HTTP layer.
    pub status: Option<u16>,
    /// JSON-RPC error object from a well-formed error response.
    pub rpc_error: Option<JsonRpcError>,
    /// Raw response body, when it was JSON.
    pub payload: Option<Value>,
}

impl RpcFailure {
    /// Wraps a JSON-RPC error response.
    pub fn from_rpc_error(error: JsonRpcError, payload: Option<Value>) -> Self {
        Self {
            message: error.to_string(),
            status: None,
            rpc_error: Some(error),
            payload,
        }
    }

    /// Wraps a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        Self {
            message: format!("HTTP {status}: {body}"),
            status: Some(status),
            rpc_error: None,
            payload: serde_json::from_str(body).ok(),
        }
    }
}
