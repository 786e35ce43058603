//! Plugin system errors
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Add CommandConflict for cross-plugin name clashes
//! - 1.0.0: Initial error set for registry and command attachment

use thiserror::Error;

/// Errors raised synchronously by the registry, plugins and host bot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin with name '{0}' already exists")]
    DuplicateName(String),

    #[error("Plugin '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("Plugin '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Plugin registry is not initialized, call init() with a bot first")]
    NotInitialized,

    #[error("Handler is already attached to command '{0}'")]
    AlreadyCommand(String),

    #[error("Command '{command}' already exists in plugin '{plugin}'")]
    CommandExists { plugin: String, command: String },

    #[error("Command '{command}' is already provided by plugin '{owner}'")]
    CommandConflict { command: String, owner: String },

    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("Guild ids must all be positive integers, got {0}")]
    InvalidGuildIds(String),
}

impl PluginError {
    pub(crate) fn invalid_command(command: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}
