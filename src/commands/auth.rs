//! Provider authorization commands.

use std::io::{self, BufRead, Write};

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::auth::manager::FlowOutcome;
use crate::auth::popup::CallbackParams;
use crate::config::Config;
use crate::error::{Result, ToolAuthError};

use super::build_client;

/// Runs the authorization flow for `provider`.
///
/// In redirect mode the user pastes the URL they were sent back to, and the
/// flow is completed from its query parameters.
pub async fn run_authorize(config: &Config, provider: &str, return_url: Option<&str>) -> Result<()> {
    let client = build_client(config)?;

    let result = match client.authorize(provider, return_url).await? {
        FlowOutcome::Completed(result) => result,
        FlowOutcome::Redirected { .. } => {
            let location = prompt_line("Paste the URL you were redirected to: ")?;
            let params = CallbackParams::from_location(location.trim());
            client
                .handle_oauth_callback(
                    params.code.as_deref().unwrap_or_default(),
                    params.state.as_deref().unwrap_or_default(),
                    params.error.as_deref(),
                )
                .await?
        }
    };

    println!(
        "{}",
        format!("Authorized {}", result.provider).green().bold()
    );
    if let Some(expires_at) = result.expires_at {
        println!("  Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(scopes) = &result.scopes {
        println!("  Scopes:  {}", scopes.join(" "));
    }
    if let Some(return_url) = &result.return_url {
        println!("  Return:  {return_url}");
    }
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Prints authorization status for one provider or every OAuth provider.
///
/// Status checks run concurrently.
pub async fn run_status(config: &Config, provider: Option<&str>) -> Result<()> {
    let client = build_client(config)?;

    let providers: Vec<String> = match provider {
        Some(p) => {
            if config.provider_oauth(p).is_none() {
                return Err(ToolAuthError::Config(format!(
                    "provider '{p}' has no OAuth configuration"
                ))
                .into());
            }
            vec![p.to_string()]
        }
        None => config
            .providers
            .iter()
            .filter(|(_, p)| p.oauth.is_some())
            .map(|(id, _)| id.clone())
            .collect(),
    };

    if providers.is_empty() {
        println!("{}", "No OAuth providers configured.".yellow());
        return Ok(());
    }

    let statuses =
        futures::future::join_all(providers.iter().map(|p| client.check_auth_status(p))).await;

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "Provider".bold(),
        "Authorized".bold(),
        "Expires".bold(),
        "Scopes".bold()
    ]);
    for (provider, status) in providers.iter().zip(statuses) {
        let authorized = if status.authorized {
            "yes".green()
        } else {
            "no".red()
        };
        let expires = status
            .expires_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let scopes = status
            .scopes
            .map(|s| s.join(" "))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![provider.cyan(), authorized, expires, scopes]);
    }

    println!("\nProvider authorization:");
    table.printstd();
    println!();
    Ok(())
}

/// Revokes `provider`'s grant at the server and forgets its token.
pub async fn run_disconnect(config: &Config, provider: &str) -> Result<()> {
    let client = build_client(config)?;
    client.disconnect_provider(provider).await?;
    println!("{}", format!("Disconnected {provider}").green());
    Ok(())
}

/// Forgets every stored provider token.
pub fn run_logout(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    client.logout();
    println!("{}", "Logged out of all providers".green());
    Ok(())
}
