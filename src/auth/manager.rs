//! Authorization flow coordinator
//!
//! [`OAuthManager`] drives one OAuth authorization per call to
//! [`OAuthManager::initiate_flow`]:
//!
//! ```text
//! IDLE -> REQUESTING_URL -> AWAITING_USER -> EXCHANGING_CODE -> COMPLETE
//!              \                  \                 \
//!               +------------------+-----------------+--> ERROR
//! ```
//!
//! - **REQUESTING_URL**: sweep expired pending authorizations, generate PKCE
//!   and state, register a pending authorization, ask the tool server for the
//!   provider's authorization URL.
//! - **AWAITING_USER**: hand the URL to the authorization hook when one is
//!   installed; otherwise open a popup and poll it, or navigate away in
//!   redirect mode and return immediately.
//! - **EXCHANGING_CODE**: consume the pending authorization matching the
//!   callback state, exchange the code, persist the token.
//!
//! The manager owns no global state; its registry and token store come from
//! an [`AuthContext`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use url::Url;
//! use toolauth::auth::AuthContext;
//! use toolauth::auth::api::HttpAuthApi;
//! use toolauth::auth::manager::{FlowOutcome, OAuthManager};
//! use toolauth::config::{OAuthConfig, ProviderOAuthConfig};
//!
//! # async fn example() -> toolauth::error::Result<()> {
//! let api = HttpAuthApi::new(Url::parse("https://tools.example.com")?, None, Duration::from_secs(30))?;
//! let manager = OAuthManager::new(Arc::new(api), AuthContext::in_memory(), OAuthConfig::default());
//!
//! let github = ProviderOAuthConfig {
//!     client_id: "Iv1.abc".to_string(),
//!     client_secret: "secret".to_string(),
//!     scopes: vec!["repo".to_string()],
//!     redirect_uri: None,
//! };
//! if let FlowOutcome::Completed(result) = manager.initiate_flow("github", &github, None).await? {
//!     println!("authorized {}", result.provider);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::auth::api::{AuthServerApi, AuthStatus, AuthorizationUrlRequest, CodeExchangeRequest};
use crate::auth::pkce;
use crate::auth::popup::{
    self, AuthorizationHook, AuthorizationPrompt, BrowserOpener, CallbackParams, PopupHandle,
    PopupRequest, WindowOpener,
};
use crate::auth::token_store::ProviderTokenRecord;
use crate::auth::AuthContext;
use crate::config::{FlowMode, OAuthConfig, ProviderOAuthConfig, StatusCheckMode};
use crate::error::{Result, ToolAuthError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Flow types
// ---------------------------------------------------------------------------

/// Where a provider's most recent flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    /// No flow has run.
    #[default]
    Idle,
    /// Waiting for the tool server to return the authorization URL.
    RequestingUrl,
    /// Waiting for the user to finish at the provider.
    AwaitingUser,
    /// Exchanging the authorization code for a token.
    ExchangingCode,
    /// Token stored.
    Complete,
    /// The flow failed.
    Error,
}

/// Token metadata returned once a flow completes.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Provider that was authorized.
    pub provider: String,
    /// The new access token.
    pub access_token: String,
    /// Token type, typically `"Bearer"`.
    pub token_type: String,
    /// Token expiry, when known.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes, when known.
    pub scopes: Option<Vec<String>>,
    /// Return location carried by the pending authorization.
    pub return_url: Option<String>,
}

impl std::fmt::Debug for AuthorizationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationResult")
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("return_url", &self.return_url)
            .finish()
    }
}

/// How [`OAuthManager::initiate_flow`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The flow ran to completion in-process.
    Completed(AuthorizationResult),
    /// Redirect mode: the user was sent to `url` and the flow resumes in
    /// [`OAuthManager::handle_callback`].
    Redirected {
        /// Provider authorization URL.
        url: String,
    },
}

// ---------------------------------------------------------------------------
// OAuthManager
// ---------------------------------------------------------------------------

/// Coordinates authorization flows for every provider.
pub struct OAuthManager {
    api: Arc<dyn AuthServerApi>,
    context: AuthContext,
    settings: OAuthConfig,
    opener: Arc<dyn WindowOpener>,
    hook: Option<Arc<dyn AuthorizationHook>>,
    provider_configs: Mutex<HashMap<String, ProviderOAuthConfig>>,
    flow_states: Mutex<HashMap<String, FlowState>>,
    popup: Mutex<Option<PopupHandle>>,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("flow_mode", &self.settings.flow_mode)
            .field("has_hook", &self.hook.is_some())
            .field("flow_states", &*lock(&self.flow_states))
            .finish_non_exhaustive()
    }
}

impl OAuthManager {
    /// Creates a manager that opens popups in the system browser.
    pub fn new(api: Arc<dyn AuthServerApi>, context: AuthContext, settings: OAuthConfig) -> Self {
        let opener = Arc::new(BrowserOpener::new(settings.popup_timeout()));
        Self {
            api,
            context,
            settings,
            opener,
            hook: None,
            provider_configs: Mutex::new(HashMap::new()),
            flow_states: Mutex::new(HashMap::new()),
            popup: Mutex::new(None),
        }
    }

    /// Replaces the window opener.
    pub fn with_opener(mut self, opener: Arc<dyn WindowOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Installs a hook that replaces window handling entirely.
    pub fn with_hook(mut self, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Makes `config` available to [`Self::handle_callback`] for flows that
    /// were started elsewhere.
    pub fn register_provider(&self, provider: &str, config: &ProviderOAuthConfig) {
        lock(&self.provider_configs).insert(provider.to_string(), config.clone());
    }

    /// The shared registry and token store.
    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Flow settings in effect.
    pub fn settings(&self) -> &OAuthConfig {
        &self.settings
    }

    /// State of the most recent flow for `provider`.
    pub fn flow_state(&self, provider: &str) -> FlowState {
        lock(&self.flow_states)
            .get(provider)
            .copied()
            .unwrap_or_default()
    }

    fn set_state(&self, provider: &str, state: FlowState) {
        tracing::debug!(provider = %provider, state = ?state, "Authorization flow state");
        lock(&self.flow_states).insert(provider.to_string(), state);
    }

    fn fail<T>(&self, provider: &str, err: anyhow::Error) -> Result<T> {
        self.set_state(provider, FlowState::Error);
        Err(err)
    }

    fn redirect_uri_for(&self, config: &ProviderOAuthConfig) -> String {
        config
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.settings.redirect_uri.clone())
    }

    /// Runs an authorization flow for `provider`.
    ///
    /// Returns [`FlowOutcome::Completed`] when the flow finishes in-process
    /// (hook or popup mode) and [`FlowOutcome::Redirected`] in redirect mode.
    ///
    /// # Errors
    ///
    /// - [`ToolAuthError::Config`] when the client id or secret is missing;
    ///   nothing is registered in that case.
    /// - [`ToolAuthError::UserCancelled`] when the popup closes first.
    /// - [`ToolAuthError::UserDenied`] when the provider reports an error.
    /// - Any error from the tool server's authorize or exchange endpoints.
    pub async fn initiate_flow(
        &self,
        provider: &str,
        oauth: &ProviderOAuthConfig,
        return_url: Option<&str>,
    ) -> Result<FlowOutcome> {
        if oauth.client_id.trim().is_empty() || oauth.client_secret.trim().is_empty() {
            return self.fail(
                provider,
                ToolAuthError::Config(format!(
                    "provider '{provider}' has no OAuth client id/secret configured"
                ))
                .into(),
            );
        }
        self.register_provider(provider, oauth);
        self.set_state(provider, FlowState::RequestingUrl);

        let swept = self.context.pending.expire(self.context.pending.ttl());
        if swept > 0 {
            tracing::debug!(swept, "Dropped expired pending authorizations");
        }

        let challenge = pkce::generate();
        let state = pkce::generate_state(return_url);
        let redirect_uri = self.redirect_uri_for(oauth);
        self.context
            .pending
            .add(&state, provider, &challenge.verifier, return_url);

        let request = AuthorizationUrlRequest {
            provider: provider.to_string(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            scopes: oauth.scopes.clone(),
            code_challenge: challenge.challenge,
            code_challenge_method: challenge.method,
            state: state.clone(),
            redirect_uri: redirect_uri.clone(),
        };
        let url = match self.api.request_authorization_url(&request).await {
            Ok(url) => url,
            Err(e) => return self.abandon(provider, &state, e),
        };
        self.set_state(provider, FlowState::AwaitingUser);

        if let Some(hook) = &self.hook {
            let prompt = AuthorizationPrompt {
                provider: provider.to_string(),
                url,
                redirect_uri,
            };
            return match hook.present(&prompt).await {
                Ok(params) => self.complete(params).await.map(FlowOutcome::Completed),
                Err(e) => self.abandon(provider, &state, e),
            };
        }

        match self.settings.flow_mode {
            FlowMode::Redirect => {
                if let Err(e) = self.opener.navigate(&url).await {
                    return self.abandon(provider, &state, e);
                }
                Ok(FlowOutcome::Redirected { url })
            }
            FlowMode::Popup => {
                let request = PopupRequest {
                    url,
                    redirect_uri: redirect_uri.clone(),
                    width: self.settings.popup_width,
                    height: self.settings.popup_height,
                };
                let window = match self.opener.open_popup(&request).await {
                    Ok(window) => window,
                    Err(e) => return self.abandon(provider, &state, e),
                };

                let (handle, rx) =
                    popup::spawn_monitor(window, redirect_uri, self.settings.poll_interval());
                if let Some(previous) = lock(&self.popup).replace(handle) {
                    previous.close();
                }

                let params = rx.await.unwrap_or_else(|_| {
                    Err(ToolAuthError::UserCancelled(
                        "authorization flow was closed".to_string(),
                    )
                    .into())
                });
                match params {
                    Ok(params) => self.complete(params).await.map(FlowOutcome::Completed),
                    Err(e) => self.abandon(provider, &state, e),
                }
            }
        }
    }

    /// Drops the pending entry for `state` and records the failure.
    fn abandon<T>(&self, provider: &str, state: &str, err: anyhow::Error) -> Result<T> {
        let _ = self.context.pending.take(state);
        self.fail(provider, err)
    }

    async fn complete(&self, params: CallbackParams) -> Result<AuthorizationResult> {
        self.finish(
            params.code.as_deref().unwrap_or_default(),
            params.state.as_deref().unwrap_or_default(),
            params.error,
            params.error_description,
        )
        .await
    }

    /// Completes a flow from its callback parameters.
    ///
    /// The pending authorization is consumed first, so an unknown or expired
    /// `state` always yields [`ToolAuthError::InvalidState`] whatever `code`
    /// and `error` contain.
    ///
    /// # Errors
    ///
    /// - [`ToolAuthError::InvalidState`] for an unknown or expired state.
    /// - [`ToolAuthError::UserDenied`] when `error` is set.
    /// - Any error from the code exchange or the token store.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
        error: Option<&str>,
    ) -> Result<AuthorizationResult> {
        self.finish(code, state, error.map(str::to_string), None)
            .await
    }

    async fn finish(
        &self,
        code: &str,
        state: &str,
        error: Option<String>,
        error_description: Option<String>,
    ) -> Result<AuthorizationResult> {
        let pending = self.context.pending.take(state)?;
        let provider = pending.provider.as_str();

        if let Some(error) = error {
            return self.fail(
                provider,
                ToolAuthError::UserDenied {
                    error,
                    description: error_description,
                }
                .into(),
            );
        }
        if code.is_empty() {
            return self.fail(
                provider,
                ToolAuthError::auth_server("authorization code missing from callback")
                    .into(),
            );
        }

        self.set_state(provider, FlowState::ExchangingCode);
        let Some(oauth) = lock(&self.provider_configs).get(provider).cloned() else {
            return self.fail(
                provider,
                ToolAuthError::Config(format!(
                    "no OAuth configuration registered for provider '{provider}'"
                ))
                .into(),
            );
        };

        let request = CodeExchangeRequest {
            provider: provider.to_string(),
            code: code.to_string(),
            code_verifier: pending.code_verifier.clone(),
            state: state.to_string(),
            redirect_uri: self.redirect_uri_for(&oauth),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
        };
        let record = match self.api.exchange_code(&request).await {
            Ok(record) => record.with_computed_expiry(),
            Err(e) => return self.fail(provider, e),
        };
        if let Err(e) = self.context.tokens.set(provider, &record) {
            return self.fail(provider, e);
        }

        self.set_state(provider, FlowState::Complete);
        tracing::info!(provider = %provider, "Provider authorization complete");

        Ok(AuthorizationResult {
            provider: provider.to_string(),
            access_token: record.access_token,
            token_type: record.token_type,
            expires_at: record.expires_at,
            scopes: record.scopes,
            return_url: pending.return_url,
        })
    }

    /// Reports whether `provider` has a usable token.
    ///
    /// In `local` mode this reads the token store only. In `remote` mode a
    /// stored token is verified against the status endpoint; any failure
    /// there reports `authorized: false`.
    pub async fn check_auth_status(&self, provider: &str) -> AuthStatus {
        let record = match self.context.tokens.get(provider) {
            Ok(Some(record)) => record,
            Ok(None) => return AuthStatus::unauthorized(),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Failed to read provider token");
                return AuthStatus::unauthorized();
            }
        };

        match self.settings.status_check {
            StatusCheckMode::Local => AuthStatus {
                authorized: !record.is_expired(),
                scopes: record.scopes,
                expires_at: record.expires_at,
            },
            StatusCheckMode::Remote => {
                match self.api.check_status(provider, &record.access_token).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(provider = %provider, error = %e, "Remote status check failed");
                        AuthStatus::unauthorized()
                    }
                }
            }
        }
    }

    /// Stored token for `provider`.
    pub fn get_provider_token(&self, provider: &str) -> Result<Option<ProviderTokenRecord>> {
        self.context.tokens.get(provider)
    }

    /// Stores `record` for `provider`.
    pub fn set_provider_token(&self, provider: &str, record: &ProviderTokenRecord) -> Result<()> {
        self.context.tokens.set(provider, record)
    }

    /// Forgets the token for `provider`.
    pub fn clear_provider_token(&self, provider: &str) -> Result<()> {
        self.context.tokens.clear(provider)
    }

    /// Revokes the grant behind `access_token` at the tool server.
    pub async fn revoke(&self, provider: &str, access_token: &str) -> Result<()> {
        self.api.revoke(provider, access_token).await
    }

    /// Drops every pending authorization.
    pub fn clear_pending(&self) {
        self.context.pending.clear_all();
    }

    /// Cancels any popup being polled. Safe to call repeatedly.
    pub fn close(&self) {
        if let Some(handle) = lock(&self.popup).take() {
            tracing::debug!("Closing authorization popup");
            handle.close();
        }
    }
}

impl Drop for OAuthManager {
    fn drop(&mut self) {
        self.close();
    }
}
