//! # Configuration
//!
//! Environment-driven bot settings and the YAML plugin manifest.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Manifest entries carry per-plugin default guild ids
//! - 1.1.0: Add PluginManifest for seeding plugin state from YAML
//! - 1.0.0: Initial Config::from_env

use crate::commands::guild_ids_from_values;
use crate::core::error::PluginError;
use crate::plugins::PluginBuilder;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::collections::HashSet;

/// Runtime settings read from the environment (and `.env` via dotenvy)
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    /// Development guild; when set every command is registered there instead of globally
    pub discord_guild_id: Option<GuildId>,
    pub log_level: String,
    pub plugins_config_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token =
            std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN environment variable not set")?;

        let discord_guild_id = match std::env::var("DISCORD_GUILD_ID") {
            Ok(raw) if !raw.trim().is_empty() => {
                let id = raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("DISCORD_GUILD_ID is not a valid id: {raw}"))?;
                Some(GuildId(id))
            }
            _ => None,
        };

        Ok(Self {
            discord_token,
            discord_guild_id,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            plugins_config_path: std::env::var("PLUGINS_CONFIG_PATH")
                .unwrap_or_else(|_| "plugins.yaml".to_string()),
        })
    }
}

/// Root of `plugins.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

/// Per-plugin settings; handlers are attached in code, the manifest only seeds state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginEntry {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raw so that non-integer ids are reported instead of silently dropped
    #[serde(default)]
    pub guild_ids: Option<Vec<serde_json::Value>>,

    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
}

impl PluginManifest {
    /// Load and validate a manifest from a YAML file
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plugin manifest {path}"))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let manifest: PluginManifest = serde_yaml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), PluginError> {
        let mut seen = HashSet::new();
        for entry in &self.plugins {
            if !seen.insert(entry.name.as_str()) {
                return Err(PluginError::DuplicateName(entry.name.clone()));
            }
            entry.guild_ids()?;
        }
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Enabled entry for `name`; disabled or missing entries yield None
    pub fn enabled_entry(&self, name: &str) -> Option<&PluginEntry> {
        self.entry(name).filter(|p| p.enabled)
    }
}

impl PluginEntry {
    pub fn guild_ids(&self) -> Result<Option<Vec<GuildId>>, PluginError> {
        self.guild_ids
            .as_deref()
            .map(guild_ids_from_values)
            .transpose()
    }

    /// Apply this entry's state and guild ids to a plugin builder
    pub fn apply(&self, mut builder: PluginBuilder) -> Result<PluginBuilder, PluginError> {
        if let Some(ids) = self.guild_ids()? {
            builder = builder.guild_ids(ids);
        }
        for (key, value) in &self.state {
            builder = builder.state(key.clone(), value.clone());
        }
        Ok(builder)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r#"
plugins:
  - name: utility
"#;
        let manifest = PluginManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.plugins.len(), 1);
        let entry = &manifest.plugins[0];
        assert!(entry.enabled); // default true
        assert!(entry.state.is_empty());
        assert_eq!(entry.guild_ids().unwrap(), None);
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
plugins:
  - name: music
    enabled: false
    guild_ids: [123456789012345678, 42]
    state:
      category: Entertainment
      max_queue: 50
"#;
        let manifest = PluginManifest::from_yaml(yaml).unwrap();
        let entry = manifest.entry("music").unwrap();
        assert!(!entry.enabled);
        assert_eq!(
            entry.guild_ids().unwrap(),
            Some(vec![GuildId(123456789012345678), GuildId(42)])
        );
        assert_eq!(entry.state["category"], "Entertainment");
        assert_eq!(entry.state["max_queue"], 50);
        assert!(manifest.enabled_entry("music").is_none());
    }

    #[test]
    fn test_rejects_string_guild_ids() {
        let yaml = r#"
plugins:
  - name: music
    guild_ids: ["123"]
"#;
        assert!(PluginManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_negative_guild_ids() {
        let yaml = r#"
plugins:
  - name: music
    guild_ids: [-5]
"#;
        assert!(PluginManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_entries() {
        let yaml = r#"
plugins:
  - name: music
  - name: music
"#;
        let manifest: PluginManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            manifest.validate(),
            Err(PluginError::DuplicateName("music".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("DISCORD_TOKEN", "token");
        std::env::set_var("DISCORD_GUILD_ID", "987");
        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("PLUGINS_CONFIG_PATH");

        let config = Config::from_env().unwrap();
        assert_eq!(config.discord_token, "token");
        assert_eq!(config.discord_guild_id, Some(GuildId(987)));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.plugins_config_path, "plugins.yaml");

        std::env::set_var("DISCORD_GUILD_ID", "not-a-number");
        assert!(Config::from_env().is_err());

        std::env::remove_var("DISCORD_GUILD_ID");
        std::env::remove_var("DISCORD_TOKEN");
        assert!(Config::from_env().is_err());
    }
}
