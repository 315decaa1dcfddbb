//! Command-line interface definition for toolauth
//!
//! This module defines the CLI structure using clap's derive API, providing
//! commands for authorizing providers and invoking tools.

use clap::{Parser, Subcommand};

use crate::config::TokenStoreKind;

/// toolauth - per-provider OAuth sessions for remote tool servers
///
/// Authorize providers, inspect their status, and call tools with the
/// matching provider token attached.
#[derive(Parser, Debug, Clone)]
#[command(name = "toolauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolauth.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the tool server base URL
    #[arg(long)]
    pub server: Option<String>,

    /// Override the token storage backend
    #[arg(long, value_enum)]
    pub token_store: Option<TokenStoreKind>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for toolauth
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the authorization flow for a provider
    Authorize {
        /// Provider id from the configuration
        provider: String,

        /// Location carried through the flow in the state token
        #[arg(long)]
        return_url: Option<String>,
    },

    /// Show authorization status for one or all OAuth providers
    Status {
        /// Provider id; all OAuth providers when omitted
        provider: Option<String>,
    },

    /// List tools advertised by the server and their owning providers
    Tools,

    /// Invoke a tool
    Call {
        /// Tool name
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Revoke a provider's grant and forget its token
    Disconnect {
        /// Provider id
        provider: String,
    },

    /// Forget every provider token and pending authorization
    Logout,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
