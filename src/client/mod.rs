//! Auth-aware tool client
//!
//! [`Client`] connects to the tool server, routes each tool call through the
//! provider that enables it, attaches that provider's token, and recovers
//! from authentication failures by asking a [`ReauthHandler`] to
//! re-authorize before retrying.
//!
//! # Module Layout
//!
//! - [`classify`]   -- Mapping raw tool-call failures onto the error taxonomy
//! - [`capability`] -- Per-provider capability names for tools
//!
//! # Examples
//!
//! ```no_run
//! use toolauth::client::Client;
//! use toolauth::config::Config;
//!
//! # async fn example() -> toolauth::error::Result<()> {
//! let config = Config::from_yaml(r#"
//! providers:
//!   plainTool:
//!     tools: [echo]
//! "#)?;
//! let client = Client::builder(&config).build()?;
//! let result = client.call_tool("echo", serde_json::json!({"text": "hi"})).await?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod classify;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::auth::api::{AuthServerApi, AuthStatus, HttpAuthApi};
use crate::auth::manager::{FlowOutcome, OAuthManager};
use crate::auth::pending::PendingAuthorizationRegistry;
use crate::auth::popup::{AuthorizationHook, WindowOpener};
use crate::auth::token_store::{KeyringTokenStore, MemoryTokenStore, ProviderTokenRecord, TokenStore};
use crate::auth::AuthContext;
use crate::client::capability::CapabilityTable;
use crate::config::{Config, ProviderConfig, ProviderOAuthConfig, TokenStoreKind};
use crate::error::{kind, AuthFailure, Result, ToolAuthError};
use crate::events::{AuthEvent, AuthEventKind, EventBus, ListenerId};
use crate::transport::http::HttpTransport;
use crate::transport::ToolTransport;
use crate::types::{
    CallToolParams, Implementation, InitializeParams, InitializeResponse, ListToolsResponse,
    PaginatedParams, ServerTool, ToolResult, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Re-authorization
// ---------------------------------------------------------------------------

/// What a [`ReauthHandler`] is told about the failure it should fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReauthContext {
    /// Provider whose token was rejected.
    pub provider: String,
    /// The classified authentication failure.
    pub error: AuthFailure,
    /// Tool whose call failed; `None` for a manual re-authentication.
    pub tool_name: Option<String>,
}

/// Re-authorizes a provider after its token was rejected.
///
/// Returning `Ok(true)` tells the client to retry the failed call. `Ok(false)`
/// and errors both decline; the original failure is then returned to the
/// caller.
#[async_trait::async_trait]
pub trait ReauthHandler: Send + Sync {
    /// Attempts to re-authorize `ctx.provider`.
    async fn reauthenticate(&self, ctx: &ReauthContext) -> Result<bool>;
}

/// Authentication state of one OAuth provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Whether the provider's token was last seen working.
    pub authenticated: bool,
    /// The failure that last marked the provider unauthenticated.
    pub last_error: Option<AuthFailure>,
}

impl AuthState {
    fn authenticated() -> Self {
        Self {
            authenticated: true,
            last_error: None,
        }
    }
}

#[derive(Debug)]
struct Session {
    protocol_version: String,
    tools: Vec<ServerTool>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a [`Client`]; every collaborator defaults to the one the
/// configuration describes.
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn ToolTransport>>,
    auth_api: Option<Arc<dyn AuthServerApi>>,
    tokens: Option<Arc<dyn TokenStore>>,
    reauth: Option<Arc<dyn ReauthHandler>>,
    opener: Option<Arc<dyn WindowOpener>>,
    hook: Option<Arc<dyn AuthorizationHook>>,
}

impl ClientBuilder {
    /// Uses `transport` for tool calls instead of HTTP.
    pub fn with_transport(mut self, transport: Arc<dyn ToolTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses `api` for the OAuth endpoints instead of HTTP.
    pub fn with_auth_api(mut self, api: Arc<dyn AuthServerApi>) -> Self {
        self.auth_api = Some(api);
        self
    }

    /// Uses `tokens` instead of the configured token store.
    pub fn with_token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Installs the handler consulted when a token is rejected.
    pub fn with_reauth_handler(mut self, handler: Arc<dyn ReauthHandler>) -> Self {
        self.reauth = Some(handler);
        self
    }

    /// Replaces the popup window opener.
    pub fn with_opener(mut self, opener: Arc<dyn WindowOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Installs a hook that presents authorization URLs itself.
    pub fn with_authorization_hook(mut self, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Validates the configuration and builds the client.
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Config`] for an invalid configuration, or an
    /// error if a default HTTP collaborator cannot be created.
    pub fn build(self) -> Result<Client> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn ToolTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(
                config.server.tool_endpoint()?,
                config.server.api_key.clone(),
                config.server.timeout(),
            )?),
        };
        let api: Arc<dyn AuthServerApi> = match self.auth_api {
            Some(api) => api,
            None => Arc::new(HttpAuthApi::new(
                config.server.base_url()?,
                config.server.api_key.clone(),
                config.server.timeout(),
            )?),
        };
        let tokens: Arc<dyn TokenStore> = match self.tokens {
            Some(tokens) => tokens,
            None => match config.token_store {
                TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
                TokenStoreKind::Keyring => {
                    Arc::new(KeyringTokenStore::new(config.client.client_name.clone()))
                }
            },
        };

        let context = AuthContext::new(
            Arc::new(PendingAuthorizationRegistry::new(config.oauth.pending_ttl())),
            tokens,
        );
        let mut manager = OAuthManager::new(api, context, config.oauth.clone());
        if let Some(opener) = self.opener {
            manager = manager.with_opener(opener);
        }
        if let Some(hook) = self.hook {
            manager = manager.with_hook(hook);
        }

        let mut tool_owners = HashMap::new();
        let mut auth_state = HashMap::new();
        for (provider, provider_config) in &config.providers {
            for tool in &provider_config.tools {
                tool_owners.insert(tool.clone(), provider.clone());
            }
            if let Some(oauth) = &provider_config.oauth {
                manager.register_provider(provider, oauth);
                let authenticated = match manager.get_provider_token(provider) {
                    Ok(record) => record.is_some_and(|r| !r.is_expired()),
                    Err(e) => {
                        tracing::warn!(provider = %provider, error = %e, "Failed to read provider token");
                        false
                    }
                };
                auth_state.insert(
                    provider.clone(),
                    AuthState {
                        authenticated,
                        last_error: None,
                    },
                );
            }
        }

        Ok(Client {
            capabilities: CapabilityTable::from_providers(&config.providers),
            providers: config.providers,
            client_name: config.client.client_name,
            max_reauth_retries: config.client.max_reauth_retries,
            lazy_connect: config.client.lazy_connect,
            tool_owners,
            transport,
            manager,
            session: tokio::sync::Mutex::new(None),
            auth_state: Mutex::new(auth_state),
            events: EventBus::new(),
            reauth: self.reauth,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Tool client with per-provider authorization.
pub struct Client {
    providers: BTreeMap<String, ProviderConfig>,
    capabilities: CapabilityTable,
    tool_owners: HashMap<String, String>,
    client_name: String,
    max_reauth_retries: u32,
    lazy_connect: bool,
    transport: Arc<dyn ToolTransport>,
    manager: OAuthManager,
    session: tokio::sync::Mutex<Option<Session>>,
    auth_state: Mutex<HashMap<String, AuthState>>,
    events: EventBus,
    reauth: Option<Arc<dyn ReauthHandler>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("transport", &self.transport)
            .field("max_reauth_retries", &self.max_reauth_retries)
            .field("has_reauth_handler", &self.reauth.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Starts building a client for `config`.
    pub fn builder(config: &Config) -> ClientBuilder {
        ClientBuilder {
            config: config.clone(),
            transport: None,
            auth_api: None,
            tokens: None,
            reauth: None,
            opener: None,
            hook: None,
        }
    }

    // -- connection ----------------------------------------------------------

    /// Performs the protocol handshake and tool discovery.
    ///
    /// Idempotent. Concurrent callers share one handshake: the second waits
    /// for the first and then returns without touching the network.
    ///
    /// # Errors
    ///
    /// Returns any transport error, or [`ToolAuthError::Transport`] if the
    /// server selects an unsupported protocol version.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: Implementation {
                name: self.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let response: InitializeResponse = serde_json::from_value(
            self.transport
                .request(METHOD_INITIALIZE, serde_json::to_value(params)?, None)
                .await?,
        )?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(ToolAuthError::Transport(format!(
                "server selected unsupported protocol version '{}'",
                response.protocol_version
            ))
            .into());
        }

        if let Err(e) = self
            .transport
            .notify(METHOD_INITIALIZED, serde_json::json!({}))
            .await
        {
            tracing::warn!(error = %e, "Failed to send initialized notification");
        }

        let tools = self.list_server_tools().await?;
        tracing::info!(
            server = %response.server_info.name,
            tools = tools.len(),
            "Connected to tool server"
        );
        *session = Some(Session {
            protocol_version: response.protocol_version,
            tools,
        });
        Ok(())
    }

    async fn list_server_tools(&self) -> Result<Vec<ServerTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = serde_json::to_value(PaginatedParams { cursor })?;
            let page: ListToolsResponse = serde_json::from_value(
                self.transport
                    .request(METHOD_TOOLS_LIST, params, None)
                    .await?,
            )?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Drops the session; the next call handshakes again.
    pub async fn disconnect(&self) {
        if self.session.lock().await.take().is_some() {
            self.transport.reset().await;
            tracing::debug!("Disconnected from tool server");
        }
    }

    /// Whether the handshake has completed.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Protocol version negotiated during the handshake.
    pub async fn protocol_version(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.protocol_version.clone())
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected().await {
            return Ok(());
        }
        if !self.lazy_connect {
            return Err(ToolAuthError::NotInitialized.into());
        }
        self.connect().await
    }

    /// Tools advertised by the server.
    pub async fn tools(&self) -> Result<Vec<ServerTool>> {
        self.ensure_connected().await?;
        Ok(self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.tools.clone())
            .unwrap_or_default())
    }

    // -- tool calls ----------------------------------------------------------

    /// Provider that enables `tool`, if any.
    pub fn resolve_provider(&self, tool: &str) -> Option<&str> {
        self.tool_owners.get(tool).map(String::as_str)
    }

    /// Calls `name` with `arguments`, attaching the owning provider's token.
    ///
    /// When the call fails with an authentication error and the retry budget
    /// allows, the provider is marked unauthenticated, an
    /// [`AuthEvent::Error`] is emitted and the [`ReauthHandler`] is asked to
    /// re-authorize. The call is retried only if it agrees.
    ///
    /// # Errors
    ///
    /// - [`ToolAuthError::NotInitialized`] if not connected and lazy connect
    ///   is off.
    /// - [`ToolAuthError::ToolNotEnabled`] if no provider enables `name`.
    /// - [`ToolAuthError::ToolNotFound`] if the server does not offer `name`.
    /// - The classified failure otherwise.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        self.ensure_connected().await?;
        let provider = self
            .resolve_provider(name)
            .ok_or_else(|| ToolAuthError::ToolNotEnabled(name.to_string()))?
            .to_string();
        let offered = self
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.tools.iter().any(|t| t.name == name));
        if !offered {
            return Err(ToolAuthError::ToolNotFound(name.to_string()).into());
        }

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        let mut retries = 0;
        loop {
            let bearer = self.bearer_for(&provider);
            tracing::debug!(tool = %name, provider = %provider, authenticated = bearer.is_some(), "Calling tool");

            let err = match self
                .transport
                .request(METHOD_TOOLS_CALL, params.clone(), bearer.as_deref())
                .await
            {
                Ok(value) => {
                    if bearer.is_some() {
                        self.set_auth_state(&provider, AuthState::authenticated());
                    }
                    return serde_json::from_value(value).map_err(|e| {
                        ToolAuthError::ToolCall {
                            tool: name.to_string(),
                            message: format!("malformed tool result: {e}"),
                        }
                        .into()
                    });
                }
                Err(e) => classify::classify(e, name, Some(&provider)),
            };

            let Some(failure) = kind(&err).and_then(ToolAuthError::auth_failure).cloned() else {
                return Err(err);
            };
            if retries >= self.max_reauth_retries {
                return Err(err);
            }

            self.set_auth_state(
                &provider,
                AuthState {
                    authenticated: false,
                    last_error: Some(failure.clone()),
                },
            );
            self.events.emit(&AuthEvent::Error {
                provider: Some(provider.clone()),
                message: err.to_string(),
            });

            let Some(handler) = &self.reauth else {
                return Err(err);
            };
            let ctx = ReauthContext {
                provider: provider.clone(),
                error: failure,
                tool_name: Some(name.to_string()),
            };
            if !self.consult(handler.as_ref(), &ctx).await {
                return Err(err);
            }

            retries += 1;
            tracing::info!(tool = %name, provider = %provider, attempt = retries, "Retrying tool call after re-authorization");
        }
    }

    /// Calls the tool registered as `capability` for `provider`.
    ///
    /// # Errors
    ///
    /// [`ToolAuthError::ToolNotEnabled`] for an unknown capability, otherwise
    /// as [`Self::call_tool`].
    pub async fn call_capability(
        &self,
        provider: &str,
        capability: &str,
        arguments: Value,
    ) -> Result<ToolResult> {
        let tool = self
            .capabilities
            .resolve(provider, capability)
            .ok_or_else(|| ToolAuthError::ToolNotEnabled(format!("{provider}.{capability}")))?
            .to_string();
        self.call_tool(&tool, arguments).await
    }

    /// The capability table built from the provider tool lists.
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    fn bearer_for(&self, provider: &str) -> Option<String> {
        if !self.is_oauth_provider(provider) {
            return None;
        }
        match self.manager.get_provider_token(provider) {
            Ok(record) => record.map(|r| r.access_token),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Failed to read provider token");
                None
            }
        }
    }

    async fn consult(&self, handler: &dyn ReauthHandler, ctx: &ReauthContext) -> bool {
        match handler.reauthenticate(ctx).await {
            Ok(proceed) => proceed,
            Err(e) => {
                tracing::warn!(provider = %ctx.provider, error = %e, "Re-authorization handler failed");
                false
            }
        }
    }

    // -- authorization -------------------------------------------------------

    fn is_oauth_provider(&self, provider: &str) -> bool {
        self.providers
            .get(provider)
            .is_some_and(|p| p.oauth.is_some())
    }

    fn oauth_config(&self, provider: &str) -> Result<ProviderOAuthConfig> {
        self.providers
            .get(provider)
            .and_then(|p| p.oauth.clone())
            .ok_or_else(|| {
                ToolAuthError::Config(format!("provider '{provider}' has no OAuth configuration"))
                    .into()
            })
    }

    /// Runs the authorization flow for `provider`.
    ///
    /// Emits [`AuthEvent::Started`] first, then [`AuthEvent::Complete`] or
    /// [`AuthEvent::Error`]. In redirect mode the flow finishes later in
    /// [`Self::handle_oauth_callback`].
    ///
    /// # Errors
    ///
    /// [`ToolAuthError::Config`] when the provider has no OAuth block, or
    /// any flow error.
    pub async fn authorize(&self, provider: &str, return_url: Option<&str>) -> Result<FlowOutcome> {
        let oauth = self.oauth_config(provider)?;
        self.events.emit(&AuthEvent::Started {
            provider: provider.to_string(),
        });

        match self.manager.initiate_flow(provider, &oauth, return_url).await {
            Ok(outcome) => {
                if let FlowOutcome::Completed(result) = &outcome {
                    self.set_auth_state(provider, AuthState::authenticated());
                    self.events.emit(&AuthEvent::Complete {
                        provider: result.provider.clone(),
                        expires_at: result.expires_at,
                        scopes: result.scopes.clone(),
                    });
                }
                Ok(outcome)
            }
            Err(e) => {
                self.events.emit(&AuthEvent::Error {
                    provider: Some(provider.to_string()),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Completes a redirect-mode flow from its callback parameters.
    ///
    /// A failure emits [`AuthEvent::Error`] naming the provider the state
    /// belonged to, or no provider when the state is unknown.
    ///
    /// # Errors
    ///
    /// As [`OAuthManager::handle_callback`].
    pub async fn handle_oauth_callback(
        &self,
        code: &str,
        state: &str,
        error: Option<&str>,
    ) -> Result<crate::auth::manager::AuthorizationResult> {
        // Resolved before the state is consumed; unknown states stay `None`.
        let provider = self.manager.context().pending.provider_for(state);
        match self.manager.handle_callback(code, state, error).await {
            Ok(result) => {
                self.set_auth_state(&result.provider, AuthState::authenticated());
                self.events.emit(&AuthEvent::Complete {
                    provider: result.provider.clone(),
                    expires_at: result.expires_at,
                    scopes: result.scopes.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                self.events.emit(&AuthEvent::Error {
                    provider,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Revokes `provider`'s grant and forgets its token.
    ///
    /// Other providers are untouched.
    ///
    /// # Errors
    ///
    /// [`ToolAuthError::ProviderNotConnected`] without any network call when
    /// no token is stored; otherwise the revoke failure, after emitting
    /// [`AuthEvent::Error`].
    pub async fn disconnect_provider(&self, provider: &str) -> Result<()> {
        let record = self
            .manager
            .get_provider_token(provider)?
            .ok_or_else(|| ToolAuthError::ProviderNotConnected(provider.to_string()))?;

        let revoked = async {
            self.manager.revoke(provider, &record.access_token).await?;
            self.manager.clear_provider_token(provider)
        }
        .await;

        match revoked {
            Ok(()) => {
                self.set_auth_state(provider, AuthState::default());
                self.events.emit(&AuthEvent::Disconnect {
                    provider: provider.to_string(),
                });
                tracing::info!(provider = %provider, "Provider disconnected");
                Ok(())
            }
            Err(e) => {
                self.events.emit(&AuthEvent::Error {
                    provider: Some(provider.to_string()),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Forgets every provider token and pending authorization.
    ///
    /// Never fails; storage errors are logged. Emits exactly one
    /// [`AuthEvent::Logout`].
    pub fn logout(&self) {
        let tokens = &self.manager.context().tokens;
        if let Err(e) = tokens.clear_all() {
            tracing::warn!(error = %e, "Failed to clear token store");
        }
        for provider in self.providers.keys().filter(|p| self.is_oauth_provider(p)) {
            if let Err(e) = tokens.clear(provider) {
                tracing::warn!(provider = %provider, error = %e, "Failed to clear provider token");
            }
        }
        self.manager.clear_pending();
        self.manager.close();

        for state in lock(&self.auth_state).values_mut() {
            *state = AuthState::default();
        }

        tracing::info!("Logged out of all providers");
        self.events.emit(&AuthEvent::Logout);
    }

    /// Asks the [`ReauthHandler`] to re-authorize `provider`.
    ///
    /// # Errors
    ///
    /// [`ToolAuthError::Config`] when no handler is installed, or the
    /// handler's own error.
    pub async fn reauthenticate(&self, provider: &str) -> Result<bool> {
        let handler = self.reauth.as_ref().ok_or_else(|| {
            ToolAuthError::Config("no re-authorization handler configured".to_string())
        })?;
        let error = self
            .get_auth_state(provider)
            .last_error
            .unwrap_or_else(|| {
                AuthFailure::new("re-authentication requested").with_provider(provider)
            });
        let ctx = ReauthContext {
            provider: provider.to_string(),
            error,
            tool_name: None,
        };

        let proceed = handler.reauthenticate(&ctx).await?;
        if proceed {
            self.set_auth_state(provider, AuthState::authenticated());
        }
        Ok(proceed)
    }

    /// Reports whether `provider` has a usable token.
    pub async fn check_auth_status(&self, provider: &str) -> AuthStatus {
        self.manager.check_auth_status(provider).await
    }

    /// Stored token for `provider`.
    pub fn get_provider_token(&self, provider: &str) -> Result<Option<ProviderTokenRecord>> {
        self.manager.get_provider_token(provider)
    }

    /// Stores `record` for `provider`.
    pub fn set_provider_token(&self, provider: &str, record: &ProviderTokenRecord) -> Result<()> {
        self.manager.set_provider_token(provider, record)
    }

    /// Forgets the token for `provider`.
    pub fn clear_provider_token(&self, provider: &str) -> Result<()> {
        self.manager.clear_provider_token(provider)
    }

    // -- state and events ----------------------------------------------------

    fn set_auth_state(&self, provider: &str, state: AuthState) {
        if !self.is_oauth_provider(provider) {
            return;
        }
        lock(&self.auth_state).insert(provider.to_string(), state);
    }

    /// Whether `provider` is currently marked authenticated.
    pub fn is_provider_authenticated(&self, provider: &str) -> bool {
        self.get_auth_state(provider).authenticated
    }

    /// Authentication state of `provider`; unauthenticated when unknown.
    pub fn get_auth_state(&self, provider: &str) -> AuthState {
        lock(&self.auth_state)
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Configured providers.
    pub fn providers(&self) -> &BTreeMap<String, ProviderConfig> {
        &self.providers
    }

    /// The authorization flow coordinator.
    pub fn manager(&self) -> &OAuthManager {
        &self.manager
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers a listener; see [`EventBus::on`].
    pub fn on(
        &self,
        kind: AuthEventKind,
        listener: impl Fn(&AuthEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// Removes a listener; see [`EventBus::off`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }
}
