// Core layer - configuration and errors
pub mod core;

// Command objects, handlers and tables
pub mod commands;

// Plugins and the process-wide registry
pub mod plugins;

// Host layer - serenity bot integration
pub mod host;

pub use self::core::{Config, PluginError, PluginManifest};

pub use commands::{handler_fn, Command, CommandHandler, CommandKind, CommandOptions, OptionSpec};
pub use host::{Bot, BotConfig, PluginEventHandler};
pub use plugins::{init, load, unload, Plugin, PluginBuilder};
