//! Tool-call failure classification
//!
//! Raw transport failures are mapped onto the error taxonomy by inspecting,
//! in order:
//!
//! 1. the JSON-RPC error object attached to an [`RpcFailure`],
//! 2. a JSON-RPC-shaped `error` object in the raw response payload,
//! 3. the HTTP status and message text (`401`/`unauthorized`, `403`/`forbidden`),
//!
//! falling back to [`ToolAuthError::ToolCall`] when nothing matches. Errors
//! that are already typed pass through unchanged.

use serde_json::Value;

use crate::error::{AuthFailure, ToolAuthError};
use crate::transport::RpcFailure;

/// Classifies a failed call to `tool`, owned by `provider`.
///
/// # Examples
///
/// ```
/// use toolauth::client::classify::classify;
/// use toolauth::error::{kind, ToolAuthError};
/// use toolauth::transport::RpcFailure;
///
/// let raw: anyhow::Error = RpcFailure::from_status(401, "Unauthorized").into();
/// let err = classify(raw, "github_list_repos", Some("github"));
/// assert!(matches!(kind(&err), Some(ToolAuthError::Authentication(_))));
/// ```
pub fn classify(err: anyhow::Error, tool: &str, provider: Option<&str>) -> anyhow::Error {
    if err.downcast_ref::<ToolAuthError>().is_some() {
        return err;
    }

    if let Some(failure) = err.downcast_ref::<RpcFailure>() {
        if let Some(rpc) = &failure.rpc_error {
            if let Some(typed) = from_code(Some(rpc.code), &rpc.message, provider) {
                return typed.into();
            }
        }
        if let Some((code, message)) = failure.payload.as_ref().and_then(payload_error) {
            if let Some(typed) = from_code(code, &message, provider) {
                return typed.into();
            }
        }
        if let Some(typed) = from_text(failure.status.map(i64::from), &failure.message, provider) {
            return typed.into();
        }
        return ToolAuthError::ToolCall {
            tool: tool.to_string(),
            message: failure.message.clone(),
        }
        .into();
    }

    let message = err.to_string();
    match from_text(None, &message, provider) {
        Some(typed) => typed.into(),
        None => ToolAuthError::ToolCall {
            tool: tool.to_string(),
            message,
        }
        .into(),
    }
}

/// Extracts `(code, message)` from `{"error": {...}}`.
fn payload_error(payload: &Value) -> Option<(Option<i64>, String)> {
    let error = payload.get("error")?;
    match error {
        Value::Object(obj) => {
            let message = obj.get("message").and_then(Value::as_str)?.to_string();
            Some((obj.get("code").and_then(Value::as_i64), message))
        }
        Value::String(message) => Some((None, message.clone())),
        _ => None,
    }
}

/// Classifies a code plus message from a structured error.
fn from_code(code: Option<i64>, message: &str, provider: Option<&str>) -> Option<ToolAuthError> {
    let lower = message.to_lowercase();
    let looks_auth = lower.contains("unauthorized")
        || lower.contains("unauthenticated")
        || lower.contains("invalid token")
        || lower.contains("invalid_token")
        || lower.contains("token expired")
        || lower.contains("authentication");
    let looks_forbidden = lower.contains("forbidden")
        || lower.contains("insufficient scope")
        || lower.contains("insufficient_scope");

    if code == Some(401) || (looks_auth && code != Some(403)) {
        return Some(authentication(code, message, &lower, provider));
    }
    if code == Some(403) || looks_forbidden {
        return Some(ToolAuthError::Authorization {
            message: message.to_string(),
            status: code,
            provider: provider.map(str::to_string),
        });
    }
    None
}

/// Classifies an HTTP status plus free-form message text.
fn from_text(status: Option<i64>, message: &str, provider: Option<&str>) -> Option<ToolAuthError> {
    if let Some(typed) = from_code(status, message, provider) {
        return Some(typed);
    }
    if message.contains("401") {
        let lower = message.to_lowercase();
        return Some(authentication(Some(401), message, &lower, provider));
    }
    if message.contains("403") {
        return Some(ToolAuthError::Authorization {
            message: message.to_string(),
            status: Some(403),
            provider: provider.map(str::to_string),
        });
    }
    None
}

fn authentication(
    code: Option<i64>,
    message: &str,
    lower: &str,
    provider: Option<&str>,
) -> ToolAuthError {
    let mut failure = AuthFailure::new(message);
    if let Some(code) = code {
        failure = failure.with_status(code);
    }
    if let Some(provider) = provider {
        failure = failure.with_provider(provider);
    }
    if lower.contains("expired") {
        ToolAuthError::TokenExpired(failure)
    } else {
        ToolAuthError::Authentication(failure)
    }
}
