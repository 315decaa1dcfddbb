//! toolauth - per-provider OAuth sessions for remote tool servers
//!
//! This library lets a process call tools on a remote tool server on behalf
//! of a user who has granted access to external providers (GitHub, Slack,
//! ...). It runs PKCE authorization flows, keeps one token per provider,
//! attaches the right token to each tool call, and re-authorizes when the
//! server rejects a token.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE, pending authorizations, token storage, the OAuth flow
//! - `client`: The auth-aware tool client and its retry loop
//! - `transport`: JSON-RPC request/response channel to the tool server
//! - `events`: Authorization lifecycle events
//! - `global`: Optional process-wide client slot
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use toolauth::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_yaml(r#"
//! providers:
//!   github:
//!     tools: [github_list_repos]
//!     oauth:
//!       client_id: Iv1.abc
//!       client_secret: secret
//! "#)?;
//!     let client = Client::builder(&config).build()?;
//!     client.authorize("github", None).await?;
//!     let repos = client.call_tool("github_list_repos", serde_json::json!({})).await?;
//!     println!("{}", repos.text());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod global;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use auth::AuthContext;
pub use client::{AuthState, Client, ReauthContext, ReauthHandler};
pub use config::Config;
pub use error::{Result, ToolAuthError};
pub use events::{AuthEvent, AuthEventKind};
