//! # Command System
//!
//! Command objects, handler trait and per-plugin command tables.
//!
//! - **Version**: 3.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 3.0.0: Commands belong to plugins; tables replace the global handler registry
//! - 2.1.0: Add modular handler infrastructure (handler trait, registry)
//! - 1.0.0: Initial reorganization with modular command structure

pub mod command;
pub mod handler;
pub mod registry;

pub use command::{
    guild_ids_from_values, Choice, Command, CommandKind, CommandOptions, OptionSpec, OPTION_LIMIT,
};
pub use handler::{handler_fn, CommandHandler, FnHandler};
pub use registry::CommandTable;
