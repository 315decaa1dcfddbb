/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `auth`  -- Authorize, inspect, disconnect and log out of providers
- `tools` -- List server tools and invoke them

Handlers build a [`Client`] from the loaded configuration and print their
results to stdout.
*/

use crate::client::Client;
use crate::config::Config;
use crate::error::Result;

// Provider authorization commands
pub mod auth;

// Tool listing and invocation commands
pub mod tools;

/// Builds the client every command runs against.
pub fn build_client(config: &Config) -> Result<Client> {
    Client::builder(config).build()
}

/// Shortens a string for table display.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer description", 10), "a much ...");
    }
}
