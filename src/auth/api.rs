//! Client for the remote tool server's OAuth endpoints
//!
//! The tool server brokers every provider integration: it builds the
//! provider's authorization URL, performs the code exchange, reports token
//! status, and revokes grants. This module only speaks that contract.
//!
//! | Operation                   | Request                          |
//! |-----------------------------|----------------------------------|
//! | request authorization URL   | `GET {base}/oauth/authorize`     |
//! | exchange code               | `POST {base}/oauth/callback`     |
//! | check status                | `GET {base}/oauth/status`        |
//! | revoke                      | `POST {base}/oauth/disconnect`   |
//!
//! Every request carries `X-API-KEY` when an API key is configured and is
//! bounded by the configured request timeout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::token_store::ProviderTokenRecord;
use crate::error::{Result, ToolAuthError};

/// Header carrying the tool server API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

// ---------------------------------------------------------------------------
// Request and response types
// ---------------------------------------------------------------------------

/// Parameters for an authorization URL request.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlRequest {
    /// Provider being authorized.
    pub provider: String,
    /// OAuth client id registered with the provider.
    pub client_id: String,
    /// OAuth client secret registered with the provider.
    pub client_secret: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// PKCE challenge.
    pub code_challenge: String,
    /// PKCE challenge method, always `S256`.
    pub code_challenge_method: String,
    /// Opaque state token.
    pub state: String,
    /// Where the provider sends the user afterwards.
    pub redirect_uri: String,
}

/// Parameters for a code exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExchangeRequest {
    /// Provider being authorized.
    pub provider: String,
    /// Authorization code returned by the provider.
    pub code: String,
    /// PKCE verifier matching the challenge sent earlier.
    pub code_verifier: String,
    /// State token the code was issued for.
    pub state: String,
    /// Redirect URI used for the authorization request.
    pub redirect_uri: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

/// Authorization status for one provider.
///
/// # Examples
///
/// ```
/// use toolauth::auth::api::AuthStatus;
///
/// let status = AuthStatus::unauthorized();
/// assert!(!status.authorized);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    /// Whether a usable token exists.
    pub authorized: bool,
    /// Granted scopes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    /// Token expiry, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthStatus {
    /// A status reporting no usable token.
    pub fn unauthorized() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizationUrlResponse {
    url: String,
}

// ---------------------------------------------------------------------------
// AuthServerApi
// ---------------------------------------------------------------------------

/// The remote OAuth broker contract.
#[async_trait::async_trait]
pub trait AuthServerApi: Send + Sync {
    /// Returns the provider authorization URL the user must visit.
    async fn request_authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String>;

    /// Exchanges an authorization code for a provider token.
    async fn exchange_code(&self, request: &CodeExchangeRequest) -> Result<ProviderTokenRecord>;

    /// Asks the server whether `access_token` is still valid for `provider`.
    async fn check_status(&self, provider: &str, access_token: &str) -> Result<AuthStatus>;

    /// Revokes the grant behind `access_token`.
    async fn revoke(&self, provider: &str, access_token: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HttpAuthApi
// ---------------------------------------------------------------------------

/// [`AuthServerApi`] over HTTP.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use url::Url;
/// use toolauth::auth::api::HttpAuthApi;
///
/// let api = HttpAuthApi::new(
///     Url::parse("https://tools.example.com").unwrap(),
///     Some("key".to_string()),
///     Duration::from_secs(30),
/// ).unwrap();
/// assert_eq!(api.base_url().as_str(), "https://tools.example.com/");
/// ```
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpAuthApi {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: Url, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ToolAuthError::Http)?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/oauth/{path}"))
            .map_err(|e| ToolAuthError::Config(format!("invalid server URL: {e}")).into())
    }

    fn with_api_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }

    async fn send(&self, operation: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = self.with_api_key(req).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolAuthError::Timeout(format!("{operation} request timed out"))
            } else {
                ToolAuthError::auth_server(format!("{operation} request failed: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolAuthError::AuthServer {
                message: format!("{operation} endpoint returned {status}: {body}"),
                status: Some(status.as_u16()),
            }
            .into());
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl AuthServerApi for HttpAuthApi {
    async fn request_authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String> {
        let mut url = self.endpoint("authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", &request.provider);
            query.append_pair("client_id", &request.client_id);
            query.append_pair("client_secret", &request.client_secret);
            if !request.scopes.is_empty() {
                query.append_pair("scope", &request.scopes.join(" "));
            }
            query.append_pair("code_challenge", &request.code_challenge);
            query.append_pair("code_challenge_method", &request.code_challenge_method);
            query.append_pair("state", &request.state);
            query.append_pair("redirect_uri", &request.redirect_uri);
        }

        let resp = self.send("authorize", self.http.get(url)).await?;
        let body: AuthorizationUrlResponse = resp.json().await.map_err(|e| {
            ToolAuthError::auth_server(format!("failed to parse authorize response: {e}"))
        })?;
        Ok(body.url)
    }

    async fn exchange_code(&self, request: &CodeExchangeRequest) -> Result<ProviderTokenRecord> {
        let url = self.endpoint("callback")?;
        let resp = self
            .send("code exchange", self.http.post(url).json(request))
            .await?;
        let record: ProviderTokenRecord = resp.json().await.map_err(|e| {
            ToolAuthError::auth_server(format!("failed to parse code exchange response: {e}"))
        })?;
        Ok(record.with_computed_expiry())
    }

    async fn check_status(&self, provider: &str, access_token: &str) -> Result<AuthStatus> {
        let mut url = self.endpoint("status")?;
        url.query_pairs_mut().append_pair("provider", provider);
        let resp = self
            .send("status", self.http.get(url).bearer_auth(access_token))
            .await?;
        let status: AuthStatus = resp.json().await.map_err(|e| {
            ToolAuthError::auth_server(format!("failed to parse status response: {e}"))
        })?;
        Ok(status)
    }

    async fn revoke(&self, provider: &str, access_token: &str) -> Result<()> {
        let url = self.endpoint("disconnect")?;
        self.send(
            "disconnect",
            self.http
                .post(url)
                .bearer_auth(access_token)
                .json(&serde_json::json!({ "provider": provider })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpAuthApi {
        HttpAuthApi::new(Url::parse(base).unwrap(), None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_without_double_slash() {
        let api = api("https://tools.example.com/");
        assert_eq!(
            api.endpoint("status").unwrap().as_str(),
            "https://tools.example.com/oauth/status"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = api("https://tools.example.com/v1");
        assert_eq!(
            api.endpoint("authorize").unwrap().as_str(),
            "https://tools.example.com/v1/oauth/authorize"
        );
    }

    #[test]
    fn test_code_exchange_request_serializes_camel_case() {
        let req = CodeExchangeRequest {
            provider: "github".into(),
            code: "c".into(),
            code_verifier: "v".into(),
            state: "s".into(),
            redirect_uri: "http://127.0.0.1:8765/callback".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["codeVerifier"], "v");
        assert_eq!(json["redirectUri"], "http://127.0.0.1:8765/callback");
    }

    #[test]
    fn test_auth_status_deserializes_minimal_body() {
        let status: AuthStatus =
            serde_json::from_value(serde_json::json!({ "authorized": true })).unwrap();
        assert!(status.authorized);
        assert!(status.scopes.is_none());
    }
}
