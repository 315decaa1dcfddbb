//! Configuration management for toolauth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! # Example
//!
//! ```yaml
//! server:
//!   url: https://tools.example.com
//!   api_key: sk-123
//! oauth:
//!   flow_mode: popup
//!   redirect_uri: http://127.0.0.1:8765/callback
//! providers:
//!   github:
//!     tools: [github_create_issue, github_list_repos]
//!     oauth:
//!       client_id: Iv1.abc
//!       scopes: [repo]
//!   plainTool:
//!     tools: [echo]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ToolAuthError};

/// Main configuration structure for toolauth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote tool server connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Authorization flow behavior
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Tool-invocation client behavior
    #[serde(default)]
    pub client: ClientConfig,
    /// Providers keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Where provider tokens are kept
    #[serde(default)]
    pub token_store: TokenStoreKind,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Remote tool server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the tool server
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Path of the JSON-RPC tool endpoint, relative to `url`
    #[serde(default = "default_tool_path")]
    pub tool_path: String,

    /// API key sent as `X-API-KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout applied to every request, including OAuth round trips
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_tool_path() -> String {
    "/mcp".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            tool_path: default_tool_path(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ServerConfig {
    /// Parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Config`] when `url` is not a valid URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.url)
            .map_err(|e| ToolAuthError::Config(format!("invalid server.url: {e}")).into())
    }

    /// URL of the JSON-RPC tool endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolauth::config::ServerConfig;
    ///
    /// let server = ServerConfig {
    ///     url: "https://tools.example.com/".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(server.tool_endpoint().unwrap().as_str(), "https://tools.example.com/mcp");
    /// ```
    pub fn tool_endpoint(&self) -> Result<Url> {
        let base = self.url.trim_end_matches('/');
        let path = self.tool_path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| ToolAuthError::Config(format!("invalid tool endpoint: {e}")).into())
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// How the authorization URL is delivered to the user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowMode {
    /// Open a window and poll it for the callback
    #[default]
    Popup,
    /// Navigate away; the callback arrives through `handle_callback`
    Redirect,
}

/// How `check_auth_status` answers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusCheckMode {
    /// Token presence in the local store
    #[default]
    Local,
    /// Ask the server's status endpoint
    Remote,
}

/// Authorization flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Delivery mode for the authorization URL
    #[serde(default)]
    pub flow_mode: FlowMode,

    /// Popup width in pixels
    #[serde(default = "default_popup_width")]
    pub popup_width: u32,

    /// Popup height in pixels
    #[serde(default = "default_popup_height")]
    pub popup_height: u32,

    /// How often an open popup is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a popup may stay open without a callback
    #[serde(default = "default_popup_timeout_seconds")]
    pub popup_timeout_seconds: u64,

    /// Redirect URI used when a provider does not set its own
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Lifetime of a pending authorization
    #[serde(default = "default_pending_ttl_seconds")]
    pub pending_ttl_seconds: u64,

    /// Local or remote status checks
    #[serde(default)]
    pub status_check: StatusCheckMode,
}

fn default_popup_width() -> u32 {
    600
}

fn default_popup_height() -> u32 {
    700
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_popup_timeout_seconds() -> u64 {
    300
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8765/callback".to_string()
}

fn default_pending_ttl_seconds() -> u64 {
    600
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            flow_mode: FlowMode::default(),
            popup_width: default_popup_width(),
            popup_height: default_popup_height(),
            poll_interval_ms: default_poll_interval_ms(),
            popup_timeout_seconds: default_popup_timeout_seconds(),
            redirect_uri: default_redirect_uri(),
            pending_ttl_seconds: default_pending_ttl_seconds(),
            status_check: StatusCheckMode::default(),
        }
    }
}

impl OAuthConfig {
    /// Popup poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Popup lifetime without a callback.
    pub fn popup_timeout(&self) -> Duration {
        Duration::from_secs(self.popup_timeout_seconds)
    }

    /// Pending authorization lifetime.
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }
}

/// Tool-invocation client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Re-authorization attempts per tool call
    #[serde(default = "default_max_reauth_retries")]
    pub max_reauth_retries: u32,

    /// Connect on first tool call instead of requiring `connect()`
    #[serde(default = "default_lazy_connect")]
    pub lazy_connect: bool,

    /// Name sent as `clientInfo.name` in the handshake
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_max_reauth_retries() -> u32 {
    1
}

fn default_lazy_connect() -> bool {
    true
}

fn default_client_name() -> String {
    "toolauth".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_reauth_retries: default_max_reauth_retries(),
            lazy_connect: default_lazy_connect(),
            client_name: default_client_name(),
        }
    }
}

/// A provider and the tools it enables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Tool names owned by this provider
    #[serde(default)]
    pub tools: Vec<String>,

    /// OAuth settings; `None` for providers that need no authorization
    #[serde(default)]
    pub oauth: Option<ProviderOAuthConfig>,
}

/// OAuth client registration for one provider
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderOAuthConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Scopes to request
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Overrides `oauth.redirect_uri` for this provider
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for ProviderOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Token storage backend
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    /// Process memory; tokens are lost on exit
    Memory,
    /// OS credential store
    #[default]
    Keyring,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {}: {}", name, raw);
            None
        }
    }
}

/// Environment variable prefix for a provider id: `github-app` becomes
/// `TOOLAUTH_GITHUB_APP`.
fn provider_env_prefix(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("TOOLAUTH_{normalized}")
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file yields the defaults. The result is validated before it
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Config`] if the file cannot be read or parsed,
    /// or if validation fails.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);
        config.validate()?;

        Ok(config)
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Config`] on malformed YAML.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ToolAuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ToolAuthError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("TOOLAUTH_SERVER_URL") {
            self.server.url = url;
        }

        if let Ok(api_key) = std::env::var("TOOLAUTH_API_KEY") {
            self.server.api_key = Some(api_key);
        }

        if let Some(timeout) = parse_env("TOOLAUTH_TIMEOUT_SECONDS") {
            self.server.timeout_seconds = timeout;
        }

        if let Ok(mode) = std::env::var("TOOLAUTH_FLOW_MODE") {
            match mode.to_lowercase().as_str() {
                "popup" => self.oauth.flow_mode = FlowMode::Popup,
                "redirect" => self.oauth.flow_mode = FlowMode::Redirect,
                _ => tracing::warn!("Invalid TOOLAUTH_FLOW_MODE: {}", mode),
            }
        }

        if let Ok(redirect_uri) = std::env::var("TOOLAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(mode) = std::env::var("TOOLAUTH_STATUS_CHECK") {
            match mode.to_lowercase().as_str() {
                "local" => self.oauth.status_check = StatusCheckMode::Local,
                "remote" => self.oauth.status_check = StatusCheckMode::Remote,
                _ => tracing::warn!("Invalid TOOLAUTH_STATUS_CHECK: {}", mode),
            }
        }

        if let Some(retries) = parse_env("TOOLAUTH_MAX_REAUTH_RETRIES") {
            self.client.max_reauth_retries = retries;
        }

        if let Ok(kind) = std::env::var("TOOLAUTH_TOKEN_STORE") {
            match kind.to_lowercase().as_str() {
                "memory" => self.token_store = TokenStoreKind::Memory,
                "keyring" => self.token_store = TokenStoreKind::Keyring,
                _ => tracing::warn!("Invalid TOOLAUTH_TOKEN_STORE: {}", kind),
            }
        }

        // Client credentials are usually injected rather than committed.
        for (provider, settings) in self.providers.iter_mut() {
            let Some(oauth) = settings.oauth.as_mut() else {
                continue;
            };
            let prefix = provider_env_prefix(provider);
            if let Ok(id) = std::env::var(format!("{prefix}_CLIENT_ID")) {
                oauth.client_id = id;
            }
            if let Ok(secret) = std::env::var(format!("{prefix}_CLIENT_SECRET")) {
                oauth.client_secret = secret;
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(server) = &cli.server {
            self.server.url = server.clone();
        }

        if let Some(kind) = cli.token_store {
            self.token_store = kind;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::Config`] for an empty or unparseable server
    /// URL, a zero timeout, TTL or poll interval, an OAuth block with an
    /// empty client id, or a tool enabled by more than one provider.
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(ToolAuthError::Config("server.url cannot be empty".to_string()).into());
        }
        self.server.base_url()?;

        if self.server.timeout_seconds == 0 {
            return Err(ToolAuthError::Config(
                "server.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.oauth.pending_ttl_seconds == 0 {
            return Err(ToolAuthError::Config(
                "oauth.pending_ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.oauth.poll_interval_ms == 0 {
            return Err(ToolAuthError::Config(
                "oauth.poll_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (provider, settings) in &self.providers {
            if let Some(oauth) = &settings.oauth {
                if oauth.client_id.trim().is_empty() {
                    return Err(ToolAuthError::Config(format!(
                        "providers.{provider}.oauth.client_id cannot be empty"
                    ))
                    .into());
                }
            }
            for tool in &settings.tools {
                if let Some(previous) = owners.insert(tool, provider) {
                    return Err(ToolAuthError::Config(format!(
                        "tool '{tool}' is enabled by both '{previous}' and '{provider}'"
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }

    /// OAuth block for `provider`, if configured.
    pub fn provider_oauth(&self, provider: &str) -> Option<&ProviderOAuthConfig> {
        self.providers.get(provider).and_then(|p| p.oauth.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn sample_yaml() -> &'static str {
        r#"
server:
  url: https://tools.example.com
  api_key: sk-123
oauth:
  flow_mode: redirect
  status_check: remote
client:
  max_reauth_retries: 2
providers:
  github:
    tools: [github_create_issue]
    oauth:
      client_id: Iv1.abc
      client_secret: shh
      scopes: [repo]
  plainTool:
    tools: [echo]
token_store: memory
"#
    }

    fn cli() -> crate::cli::Cli {
        crate::cli::Cli {
            config: None,
            verbose: false,
            server: None,
            token_store: None,
            command: crate::cli::Commands::Logout,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:3000");
        assert_eq!(config.client.max_reauth_retries, 1);
        assert!(config.client.lazy_connect);
        assert_eq!(config.oauth.flow_mode, FlowMode::Popup);
        assert_eq!(config.oauth.status_check, StatusCheckMode::Local);
        assert_eq!(config.oauth.pending_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let config = Config::from_yaml(sample_yaml()).unwrap();
        assert_eq!(config.oauth.flow_mode, FlowMode::Redirect);
        assert_eq!(config.oauth.status_check, StatusCheckMode::Remote);
        assert_eq!(config.client.max_reauth_retries, 2);
        assert_eq!(config.token_store, TokenStoreKind::Memory);
        assert_eq!(config.provider_oauth("github").unwrap().scopes, vec!["repo"]);
        assert!(config.provider_oauth("plainTool").is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_server_url() {
        let mut config = Config::default();
        config.server.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.server.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_ttl_and_poll_interval() {
        let mut config = Config::default();
        config.oauth.pending_ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.oauth.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_client_id() {
        let mut config = Config::from_yaml(sample_yaml()).unwrap();
        if let Some(oauth) = config
            .providers
            .get_mut("github")
            .and_then(|p| p.oauth.as_mut())
        {
            oauth.client_id = String::new();
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_config_validation_tool_owned_twice() {
        let mut config = Config::from_yaml(sample_yaml()).unwrap();
        config.providers.insert(
            "other".to_string(),
            ProviderConfig {
                tools: vec!["echo".to_string()],
                oauth: None,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'echo'"));
    }

    #[test]
    fn test_tool_endpoint_joins_path() {
        let server = ServerConfig {
            url: "http://localhost:3000".to_string(),
            tool_path: "rpc".to_string(),
            ..Default::default()
        };
        assert_eq!(
            server.tool_endpoint().unwrap().as_str(),
            "http://localhost:3000/rpc"
        );
    }

    #[test]
    fn test_provider_env_prefix() {
        assert_eq!(provider_env_prefix("github-app"), "TOOLAUTH_GITHUB_APP");
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let oauth = ProviderOAuthConfig {
            client_id: "id".to_string(),
            client_secret: "super-secret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{oauth:?}").contains("super-secret"));
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent-toolauth.yaml", &cli()).unwrap();
        assert_eq!(config.server.timeout_seconds, 30);
    }

    #[test]
    #[serial]
    fn test_load_applies_env_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolauth.yaml");
        std::fs::write(&path, sample_yaml()).unwrap();

        std::env::set_var("TOOLAUTH_GITHUB_CLIENT_SECRET", "from-env");
        std::env::set_var("TOOLAUTH_MAX_REAUTH_RETRIES", "3");
        let mut cli = cli();
        cli.server = Some("https://override.example.com".to_string());
        let config = Config::load(path.to_str().unwrap(), &cli);
        std::env::remove_var("TOOLAUTH_GITHUB_CLIENT_SECRET");
        std::env::remove_var("TOOLAUTH_MAX_REAUTH_RETRIES");

        let config = config.unwrap();
        assert_eq!(config.server.url, "https://override.example.com");
        assert_eq!(config.client.max_reauth_retries, 3);
        assert_eq!(
            config.provider_oauth("github").unwrap().client_secret,
            "from-env"
        );
    }
}
