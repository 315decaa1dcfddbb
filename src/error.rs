//! Error types for toolauth
//!
//! This module defines the error taxonomy used by the authorization core and
//! the tool-invocation client, using `thiserror` for ergonomic error handling.
//!
//! Every public operation returns [`Result`], an `anyhow` alias. Callers that
//! need to branch on the failure kind recover the typed error with
//! `err.downcast_ref::<ToolAuthError>()`.

use std::fmt;

use thiserror::Error;

/// Details of a failed authentication attempt.
///
/// Shared by [`ToolAuthError::Authentication`] and
/// [`ToolAuthError::TokenExpired`] and cheap to clone so that it can be kept
/// as the last error of a provider's auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Human-readable failure message.
    pub message: String,
    /// HTTP status or JSON-RPC code that triggered the failure, if known.
    pub status: Option<i64>,
    /// Provider whose token was rejected, if known.
    pub provider: Option<String>,
}

impl AuthFailure {
    /// Creates a failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            provider: None,
        }
    }

    /// Attaches a status code.
    pub fn with_status(mut self, status: i64) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the provider id.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(provider) = &self.provider {
            write!(f, " (provider: {provider})")?;
        }
        Ok(())
    }
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" - {d}"))
        .unwrap_or_default()
}

/// Main error type for toolauth operations
#[derive(Error, Debug)]
pub enum ToolAuthError {
    /// Missing or invalid configuration (client id/secret, OAuth block, hook)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Callback state did not match a live pending authorization.
    ///
    /// Deliberately carries no detail: forged, expired, and mistyped states
    /// are indistinguishable to the caller.
    #[error("Invalid state parameter")]
    InvalidState,

    /// The provider reported that the user denied the authorization request
    #[error("Authorization denied by user: {error}{}", describe(.description))]
    UserDenied {
        /// OAuth error code, e.g. `access_denied`
        error: String,
        /// Optional provider-supplied description
        description: Option<String>,
    },

    /// The user closed the authorization window or the flow was closed
    #[error("Authorization cancelled: {0}")]
    UserCancelled(String),

    /// A tool call was rejected because the token is missing or invalid (401)
    #[error("Authentication error: {0}")]
    Authentication(AuthFailure),

    /// A tool call was rejected because the token expired
    #[error("Token expired: {0}")]
    TokenExpired(AuthFailure),

    /// A tool call was rejected for insufficient permissions (403)
    #[error("Authorization error: {message}")]
    Authorization {
        /// Failure message
        message: String,
        /// HTTP status or JSON-RPC code, if known
        status: Option<i64>,
        /// Provider owning the tool, if known
        provider: Option<String>,
    },

    /// Any other tool-specific failure
    #[error("Tool call failed for '{tool}': {message}")]
    ToolCall {
        /// Name of the tool that failed
        tool: String,
        /// Underlying failure message
        message: String,
    },

    /// The client has not completed the protocol handshake
    #[error("Client not initialized: call connect() before invoking tools")]
    NotInitialized,

    /// No configured provider enables the tool
    #[error("Tool '{0}' is not enabled by any configured provider")]
    ToolNotEnabled(String),

    /// The server did not advertise the tool during discovery
    #[error("Tool '{0}' was not found on the server")]
    ToolNotFound(String),

    /// Disconnect requested for a provider that holds no access token
    #[error("No access token available for provider '{0}'; cannot disconnect")]
    ProviderNotConnected(String),

    /// Transport-level failure (closed connection, malformed response)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote auth server returned an unexpected response
    #[error("Auth server error: {message}")]
    AuthServer {
        /// What went wrong.
        message: String,
        /// HTTP status of a non-2xx response.
        status: Option<u16>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl ToolAuthError {
    /// An auth server failure without an HTTP status.
    pub fn auth_server(message: impl Into<String>) -> Self {
        Self::AuthServer {
            message: message.into(),
            status: None,
        }
    }

    /// Returns `true` for failures that may be fixed by re-authenticating.
    ///
    /// Only [`ToolAuthError::Authentication`] and its expiry subtype qualify;
    /// a 403 is never retried with the same scopes.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::TokenExpired(_))
    }

    /// Returns the authentication details for auth-flavored errors.
    pub fn auth_failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Authentication(f) | Self::TokenExpired(f) => Some(f),
            _ => None,
        }
    }

    /// Returns `true` for client usage errors that never touch auth state.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::ToolNotEnabled(_) | Self::ToolNotFound(_)
        )
    }
}

/// Result type alias for toolauth operations
///
/// Uses `anyhow::Error` so that context can be attached while the typed
/// [`ToolAuthError`] remains recoverable via downcasting.
pub type Result<T> = anyhow::Result<T>;

/// Returns the typed error inside an `anyhow::Error`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&ToolAuthError> {
    err.downcast_ref::<ToolAuthError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ToolAuthError::Config("missing client id".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing client id");
    }

    #[test]
    fn test_invalid_state_display_is_fixed() {
        assert_eq!(
            ToolAuthError::InvalidState.to_string(),
            "Invalid state parameter"
        );
    }

    #[test]
    fn test_user_denied_display_with_description() {
        let error = ToolAuthError::UserDenied {
            error: "access_denied".to_string(),
            description: Some("user said no".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Authorization denied by user: access_denied - user said no"
        );
    }

    #[test]
    fn test_user_denied_display_without_description() {
        let error = ToolAuthError::UserDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(error.to_string(), "Authorization denied by user: access_denied");
    }

    #[test]
    fn test_authentication_display_includes_provider() {
        let error = ToolAuthError::Authentication(
            AuthFailure::new("401 Unauthorized").with_provider("github"),
        );
        assert_eq!(
            error.to_string(),
            "Authentication error: 401 Unauthorized (provider: github)"
        );
    }

    #[test]
    fn test_token_expired_is_authentication() {
        let error = ToolAuthError::TokenExpired(AuthFailure::new("token expired"));
        assert!(error.is_authentication());
        assert_eq!(error.auth_failure().unwrap().message, "token expired");
    }

    #[test]
    fn test_authorization_is_not_authentication() {
        let error = ToolAuthError::Authorization {
            message: "forbidden".to_string(),
            status: Some(403),
            provider: None,
        };
        assert!(!error.is_authentication());
        assert!(error.auth_failure().is_none());
    }

    #[test]
    fn test_auth_server_status_is_kept() {
        let error = ToolAuthError::AuthServer {
            message: "authorize endpoint returned 502".to_string(),
            status: Some(502),
        };
        assert_eq!(
            error.to_string(),
            "Auth server error: authorize endpoint returned 502"
        );
        assert!(matches!(
            ToolAuthError::auth_server("bad body"),
            ToolAuthError::AuthServer { status: None, .. }
        ));
    }

    #[test]
    fn test_usage_errors() {
        assert!(ToolAuthError::NotInitialized.is_usage_error());
        assert!(ToolAuthError::ToolNotEnabled("x".into()).is_usage_error());
        assert!(ToolAuthError::ToolNotFound("x".into()).is_usage_error());
        assert!(!ToolAuthError::InvalidState.is_usage_error());
    }

    #[test]
    fn test_kind_recovers_typed_error_from_anyhow() {
        let err: anyhow::Error = ToolAuthError::ToolNotFound("echo".into()).into();
        assert!(matches!(kind(&err), Some(ToolAuthError::ToolNotFound(t)) if t == "echo"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ToolAuthError = io_error.into();
        assert!(matches!(error, ToolAuthError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ToolAuthError = json_error.into();
        assert!(matches!(error, ToolAuthError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ToolAuthError>();
    }
}
