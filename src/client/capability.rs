//! Capability names for provider tools
//!
//! Each provider exposes its tools under short camelCase capability names,
//! resolved once when the client is built: `github_create_issue` owned by
//! `github` becomes `github.createIssue`.

use std::collections::{BTreeMap, HashMap};

use crate::config::ProviderConfig;

/// Derives the capability name of `tool` within `provider`.
///
/// The `{provider}_` prefix is stripped and the remainder camelCased.
///
/// # Examples
///
/// ```
/// use toolauth::client::capability::capability_name;
///
/// assert_eq!(capability_name("github_create_issue", "github"), "createIssue");
/// assert_eq!(capability_name("echo", "plainTool"), "echo");
/// ```
pub fn capability_name(tool: &str, provider: &str) -> String {
    let stem = tool
        .strip_prefix(provider)
        .and_then(|rest| rest.strip_prefix(['_', '-']))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(tool);

    let mut out = String::with_capacity(stem.len());
    for (i, word) in stem.split(['_', '-']).filter(|w| !w.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Provider capability to tool name lookup.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<String, BTreeMap<String, String>>,
}

impl CapabilityTable {
    /// Builds the table from every provider's tool list.
    pub fn from_providers(providers: &BTreeMap<String, ProviderConfig>) -> Self {
        let mut entries: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        for (provider, config) in providers {
            let caps = entries.entry(provider.clone()).or_default();
            for tool in &config.tools {
                let name = capability_name(tool, provider);
                if let Some(previous) = caps.insert(name.clone(), tool.clone()) {
                    tracing::warn!(
                        provider = %provider,
                        capability = %name,
                        shadowed = %previous,
                        "Capability name collision"
                    );
                }
            }
        }
        Self { entries }
    }

    /// Tool behind `provider.capability`.
    pub fn resolve(&self, provider: &str, capability: &str) -> Option<&str> {
        self.entries
            .get(provider)
            .and_then(|caps| caps.get(capability))
            .map(String::as_str)
    }

    /// Capability names of `provider`, sorted.
    pub fn capabilities(&self, provider: &str) -> Vec<&str> {
        self.entries
            .get(provider)
            .map(|caps| caps.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name_variants() {
        assert_eq!(capability_name("github_list_repos", "github"), "listRepos");
        assert_eq!(capability_name("slack-post-message", "slack"), "postMessage");
        assert_eq!(capability_name("search_code", "github"), "searchCode");
        assert_eq!(capability_name("github", "github"), "github");
    }

    #[test]
    fn test_table_resolves_per_provider() {
        let mut providers = BTreeMap::new();
        providers.insert(
            "github".to_string(),
            ProviderConfig {
                tools: vec!["github_create_issue".to_string()],
                oauth: None,
            },
        );
        providers.insert(
            "plainTool".to_string(),
            ProviderConfig {
                tools: vec!["echo".to_string()],
                oauth: None,
            },
        );

        let table = CapabilityTable::from_providers(&providers);
        assert_eq!(table.resolve("github", "createIssue"), Some("github_create_issue"));
        assert_eq!(table.resolve("plainTool", "echo"), Some("echo"));
        assert_eq!(table.resolve("github", "echo"), None);
        assert_eq!(table.capabilities("github"), vec!["createIssue"]);
    }
}
