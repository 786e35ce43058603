//! Per-plugin command table
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Keyed by qualified name, concurrent map, rejects duplicates
//! - 1.0.0: Initial implementation for handler dispatch

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::command::Command;
use super::handler::{same_handler, CommandHandler};

/// Mapping from qualified command name to command
///
/// One table exists per command kind on every plugin. Lookups and inserts can
/// happen from any task; an insert never replaces an existing command.
#[derive(Default)]
pub struct CommandTable {
    commands: DashMap<String, Arc<Command>>,
}

impl CommandTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a command under its qualified name
    ///
    /// Returns the command back as `Err` when the name is already taken.
    pub fn insert(&self, command: Arc<Command>) -> Result<Arc<Command>, Arc<Command>> {
        match self.commands.entry(command.qualified_name()) {
            Entry::Occupied(_) => Err(command),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&command));
                Ok(command)
            }
        }
    }

    /// Get command by qualified name
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a command is registered
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Qualified name of the command backed by `handler`, if any
    pub fn find_handler(&self, handler: &Arc<dyn CommandHandler>) -> Option<String> {
        self.commands
            .iter()
            .find(|entry| same_handler(entry.value().handler(), handler))
            .map(|entry| entry.key().clone())
    }

    /// Number of commands in the table
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All qualified names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All commands, sorted by qualified name
    pub fn commands(&self) -> Vec<Arc<Command>> {
        let mut commands: Vec<Arc<Command>> =
            self.commands.iter().map(|e| Arc::clone(e.value())).collect();
        commands.sort_by_key(|c| c.qualified_name());
        commands
    }
}
