//! # Host Layer
//!
//! The serenity-facing side: the bot plugins load into and its gateway handler.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod bot;
pub mod events;

pub use bot::{Bot, BotConfig, CommandSet, LoadedPlugin, Resolved};
pub use events::PluginEventHandler;
