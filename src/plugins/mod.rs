//! # Feature: Plugin System
//!
//! Group related commands under named plugins, keep per-plugin state, and load
//! them into a single running bot.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Plugins are code-defined command groups; YAML only seeds state
//! - 1.1.0: Add load/unload against the host bot
//! - 1.0.0: Initial release with registry and Plugin

pub mod plugin;
pub mod registry;

pub use plugin::{Plugin, PluginBuilder};
pub use registry::{bot, get, init, is_initialized, load, names, unload};
