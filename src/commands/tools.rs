//! Tool listing and invocation commands.

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::config::Config;
use crate::error::{Result, ToolAuthError};
use crate::types::ToolResponseContent;

use super::{build_client, truncate};

/// Lists server tools with the provider that enables each.
pub async fn run_tools(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    let tools = client.tools().await?;

    if tools.is_empty() {
        println!("{}", "The server advertises no tools.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "Tool".bold(),
        "Provider".bold(),
        "Capability".bold(),
        "Description".bold()
    ]);
    for tool in &tools {
        let (provider, capability) = match client.resolve_provider(&tool.name) {
            Some(p) => (
                p.to_string(),
                crate::client::capability::capability_name(&tool.name, p),
            ),
            None => ("(not enabled)".to_string(), "-".to_string()),
        };
        let description = tool
            .description
            .as_deref()
            .map(|d| truncate(d, 60))
            .unwrap_or_default();
        table.add_row(row![tool.name.cyan(), provider, capability, description]);
    }

    println!("\nServer tools:");
    table.printstd();
    println!();
    Ok(())
}

/// Calls `tool` with JSON `args` and prints the result.
pub async fn run_call(config: &Config, tool: &str, args: &str) -> Result<()> {
    let arguments: serde_json::Value = serde_json::from_str(args)?;
    if !arguments.is_object() {
        return Err(ToolAuthError::Config("--args must be a JSON object".to_string()).into());
    }

    let client = build_client(config)?;
    let result = client.call_tool(tool, arguments).await?;

    if result.is_error.unwrap_or(false) {
        println!("{}", format!("{tool} reported an error:").red());
    }
    for item in &result.content {
        match item {
            ToolResponseContent::Text { text } => println!("{text}"),
            ToolResponseContent::Image { mime_type, data } => {
                println!("[image {mime_type}, {} bytes base64]", data.len());
            }
            ToolResponseContent::Unsupported => println!("[unsupported content]"),
        }
    }
    if let Some(structured) = &result.structured_content {
        println!("{}", serde_json::to_string_pretty(structured)?);
    }
    Ok(())
}
