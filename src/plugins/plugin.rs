//! # Plugin
//!
//! A named group of related commands with free-form state.
//!
//! - **Version**: 1.3.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.3.1: Sub-commands reject scope fields and a 26th sibling
//! - 1.3.0: Sub-commands attach to an existing slash command of the plugin
//! - 1.2.0: Cross-plugin name conflicts are rejected once loaded
//! - 1.1.0: Builder with default guild ids
//! - 1.0.0: Initial plugin with state and slash commands

use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use serenity::model::application::command::CommandType;
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::registry;
use crate::commands::{
    Command, CommandHandler, CommandKind, CommandOptions, CommandTable, OPTION_LIMIT,
};
use crate::core::error::PluginError;

/// Represents a specific group of related commands
///
/// Constructing a plugin registers it in the process-wide registry, so each
/// name exists at most once between [`registry::init`] calls. `state` can hold
/// anything the plugin wants to keep around, e.g. a category or required
/// permissions.
pub struct Plugin {
    name: String,
    state: DashMap<String, Value>,
    default_guild_ids: Option<Vec<GuildId>>,
    slash_commands: CommandTable,
    message_commands: CommandTable,
    user_commands: CommandTable,
    groups: CommandTable,
}

/// Collects construction parameters for a [`Plugin`]
#[derive(Debug, Clone)]
pub struct PluginBuilder {
    name: String,
    state: HashMap<String, Value>,
    guild_ids: Option<Vec<GuildId>>,
}

impl PluginBuilder {
    /// Add a state entry
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Guilds used by commands that do not name their own
    pub fn guild_ids(mut self, ids: impl IntoIterator<Item = GuildId>) -> Self {
        self.guild_ids = Some(ids.into_iter().collect());
        self
    }

    /// Construct and register the plugin
    pub fn build(self) -> Result<Arc<Plugin>, PluginError> {
        if let Some(zero) = self.guild_ids.iter().flatten().find(|id| id.0 == 0) {
            return Err(PluginError::InvalidGuildIds(zero.0.to_string()));
        }
        registry::register(Arc::new(Plugin::from_parts(
            self.name,
            self.state,
            self.guild_ids,
        )))
    }
}

impl Plugin {
    /// Create and register a plugin with empty state
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>, PluginError> {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> PluginBuilder {
        PluginBuilder {
            name: name.into(),
            state: HashMap::new(),
            guild_ids: None,
        }
    }

    fn from_parts(
        name: String,
        state: HashMap<String, Value>,
        default_guild_ids: Option<Vec<GuildId>>,
    ) -> Self {
        Self {
            name,
            state: state.into_iter().collect(),
            default_guild_ids,
            slash_commands: CommandTable::new(),
            message_commands: CommandTable::new(),
            user_commands: CommandTable::new(),
            groups: CommandTable::new(),
        }
    }

    /// Unregistered plugin for exercising registry failure paths
    #[cfg(test)]
    pub(crate) fn detached(name: &str) -> Self {
        Self::from_parts(name.to_string(), HashMap::new(), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the plugin state
    pub fn state(&self) -> HashMap<String, Value> {
        self.state
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.get(key).map(|entry| entry.value().clone())
    }

    /// Set a state entry, returning the previous value
    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.state.insert(key.into(), value.into())
    }

    pub fn remove_state(&self, key: &str) -> Option<Value> {
        self.state.remove(key).map(|(_, value)| value)
    }

    pub fn default_guild_ids(&self) -> Option<&[GuildId]> {
        self.default_guild_ids.as_deref()
    }

    pub fn slash_commands(&self) -> &CommandTable {
        &self.slash_commands
    }

    pub fn message_commands(&self) -> &CommandTable {
        &self.message_commands
    }

    pub fn user_commands(&self) -> &CommandTable {
        &self.user_commands
    }

    /// Sub-commands keyed by `"parent sub"`
    pub fn groups(&self) -> &CommandTable {
        &self.groups
    }

    pub fn table(&self, kind: CommandKind) -> &CommandTable {
        match kind {
            CommandKind::Slash => &self.slash_commands,
            CommandKind::SubCommand => &self.groups,
            CommandKind::Message => &self.message_commands,
            CommandKind::User => &self.user_commands,
        }
    }

    /// Total commands across all tables
    pub fn command_count(&self) -> usize {
        self.slash_commands.len()
            + self.message_commands.len()
            + self.user_commands.len()
            + self.groups.len()
    }

    /// Sub-commands attached to `parent`, sorted by name
    pub fn sub_commands_of(&self, parent: &str) -> Vec<Arc<Command>> {
        self.groups
            .commands()
            .into_iter()
            .filter(|cmd| cmd.parent() == Some(parent))
            .collect()
    }

    /// Whether this plugin registers a top-level command of `command_type` named `name`
    pub fn provides(&self, command_type: CommandType, name: &str) -> bool {
        match command_type {
            CommandType::ChatInput => self.slash_commands.contains(name),
            CommandType::Message => self.message_commands.contains(name),
            CommandType::User => self.user_commands.contains(name),
            _ => false,
        }
    }

    /// Attach a slash command handler and return the created command
    pub fn slash_command(
        &self,
        options: CommandOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Command>, PluginError> {
        self.attach(CommandKind::Slash, None, options, handler)
    }

    /// Attach a sub-command under an existing slash command of this plugin
    ///
    /// The sub-command inherits the parent's guilds and permissions, so setting
    /// `guild_ids`, `dm_permission` or `default_member_permissions` is an error.
    /// When invoked, the parent handler runs first.
    pub fn sub_command(
        &self,
        parent: &str,
        options: CommandOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Command>, PluginError> {
        let parent_cmd = self.slash_commands.get(parent).ok_or_else(|| {
            PluginError::invalid_command(
                parent,
                format!("not a slash command of plugin '{}'", self.name),
            )
        })?;
        if !parent_cmd.options().is_empty() {
            return Err(PluginError::invalid_command(
                parent,
                "a command with sub-commands cannot take options",
            ));
        }
        if options.guild_ids.is_some()
            || options.dm_permission.is_some()
            || options.default_member_permissions.is_some()
        {
            return Err(PluginError::invalid_command(
                &options.name,
                format!("sub-commands take guilds and permissions from '{parent}'"),
            ));
        }
        if self.sub_commands_of(parent).len() >= OPTION_LIMIT {
            return Err(PluginError::invalid_command(
                parent,
                format!("more than {OPTION_LIMIT} sub-commands"),
            ));
        }
        self.attach(CommandKind::SubCommand, Some(parent), options, handler)
    }

    /// Attach a message context menu handler
    pub fn message_command(
        &self,
        options: CommandOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Command>, PluginError> {
        self.attach(CommandKind::Message, None, options, handler)
    }

    /// Attach a user context menu handler
    pub fn user_command(
        &self,
        options: CommandOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Command>, PluginError> {
        self.attach(CommandKind::User, None, options, handler)
    }

    fn attach(
        &self,
        kind: CommandKind,
        parent: Option<&str>,
        options: CommandOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Command>, PluginError> {
        for table in [
            &self.slash_commands,
            &self.groups,
            &self.message_commands,
            &self.user_commands,
        ] {
            if let Some(existing) = table.find_handler(&handler) {
                return Err(PluginError::AlreadyCommand(existing));
            }
        }

        let defaults = match kind {
            CommandKind::SubCommand => None,
            _ => self.default_guild_ids(),
        };
        let command = Command::new(kind, parent, options, defaults, handler)?;

        if kind != CommandKind::SubCommand {
            if let Some(bot) = registry::bot().filter(|bot| bot.is_loaded(&self.name)) {
                if let Some(owner) =
                    bot.command_owner(kind.command_type(), command.name(), Some(&self.name))
                {
                    return Err(PluginError::CommandConflict {
                        command: command.name().to_string(),
                        owner,
                    });
                }
            }
        }

        let command = self
            .table(kind)
            .insert(Arc::new(command))
            .map_err(|rejected| PluginError::CommandExists {
                plugin: self.name.clone(),
                command: rejected.qualified_name(),
            })?;

        debug!(
            "Plugin '{}' attached {} '{}'",
            self.name,
            kind,
            command.qualified_name()
        );
        Ok(command)
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{handler_fn, OptionSpec};
    use crate::host::{Bot, BotConfig};
    use serde_json::json;
    use serenity::model::permissions::Permissions;
    use serial_test::serial;

    fn fresh_bot() -> Arc<Bot> {
        let bot = Arc::new(Bot::new(BotConfig::default()));
        registry::init(Arc::clone(&bot));
        bot
    }

    fn noop() -> Arc<dyn CommandHandler> {
        handler_fn(|_, _, _| async { Ok(()) })
    }

    #[test]
    #[serial]
    fn test_basic() {
        fresh_bot();
        let plugin = Plugin::new("test").unwrap();

        assert_eq!(plugin.name(), "test");
        assert_eq!(plugin.to_string(), "test");
        assert_eq!(format!("{plugin:?}"), r#"Plugin { name: "test", .. }"#);

        Plugin::new("existing_plugin").unwrap();
        assert_eq!(
            Plugin::new("existing_plugin").unwrap_err(),
            PluginError::DuplicateName("existing_plugin".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_state() {
        fresh_bot();
        let empty_plugin = Plugin::new("empty_plugin").unwrap();
        assert!(empty_plugin.state().is_empty());

        let valid_plugin = Plugin::builder("valid_plugin")
            .state("state_key", "state_value")
            .build()
            .unwrap();
        assert_eq!(valid_plugin.state().len(), 1);
        assert_eq!(
            valid_plugin.get_state("state_key"),
            Some(json!("state_value"))
        );

        assert_eq!(valid_plugin.set_state("count", 1), None);
        assert_eq!(valid_plugin.set_state("count", 2), Some(json!(1)));
        assert_eq!(valid_plugin.remove_state("count"), Some(json!(2)));
        assert_eq!(valid_plugin.get_state("count"), None);
    }

    #[test]
    #[serial]
    fn test_builder_rejects_zero_guild() {
        fresh_bot();
        let result = Plugin::builder("bad").guild_ids([GuildId(0)]).build();
        assert!(matches!(result, Err(PluginError::InvalidGuildIds(_))));
        // Nothing was registered
        assert!(registry::get("bad").is_none());
    }

    #[test]
    #[serial]
    fn test_slash_command_returns_stored_command() {
        fresh_bot();
        let plugin = Plugin::new("utility").unwrap();
        let command = plugin
            .slash_command(CommandOptions::new("ping").description("Pong"), noop())
            .unwrap();

        let stored = plugin.slash_commands().get("ping").unwrap();
        assert!(Arc::ptr_eq(&command, &stored));
        assert_eq!(plugin.command_count(), 1);
        assert!(plugin.provides(CommandType::ChatInput, "ping"));
        assert!(!plugin.provides(CommandType::Message, "ping"));
    }

    #[test]
    #[serial]
    fn test_handler_cannot_be_attached_twice() {
        fresh_bot();
        let plugin = Plugin::new("utility").unwrap();
        let handler = noop();
        plugin
            .slash_command(CommandOptions::new("ping"), Arc::clone(&handler))
            .unwrap();

        assert_eq!(
            plugin
                .message_command(CommandOptions::new("Ping"), handler)
                .unwrap_err(),
            PluginError::AlreadyCommand("ping".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_duplicate_command_name() {
        fresh_bot();
        let plugin = Plugin::new("utility").unwrap();
        plugin.slash_command(CommandOptions::new("ping"), noop()).unwrap();
        assert_eq!(
            plugin.slash_command(CommandOptions::new("ping"), noop()).unwrap_err(),
            PluginError::CommandExists {
                plugin: "utility".to_string(),
                command: "ping".to_string(),
            }
        );
        // Same name in another table is fine
        plugin.user_command(CommandOptions::new("ping"), noop()).unwrap();
    }

    #[test]
    #[serial]
    fn test_default_guild_ids() {
        fresh_bot();
        let plugin = Plugin::builder("guilded")
            .guild_ids([GuildId(11)])
            .build()
            .unwrap();
        let command = plugin
            .slash_command(CommandOptions::new("ping"), noop())
            .unwrap();
        assert_eq!(command.guild_ids(), Some(&[GuildId(11)][..]));
    }

    #[test]
    #[serial]
    fn test_sub_command_requires_parent() {
        fresh_bot();
        let plugin = Plugin::new("music").unwrap();
        assert!(plugin
            .sub_command("queue", CommandOptions::new("add"), noop())
            .is_err());

        plugin.slash_command(CommandOptions::new("queue"), noop()).unwrap();
        let add = plugin
            .sub_command("queue", CommandOptions::new("add"), noop())
            .unwrap();
        assert_eq!(add.qualified_name(), "queue add");
        assert!(plugin.groups().contains("queue add"));
        assert_eq!(plugin.sub_commands_of("queue").len(), 1);
    }

    #[test]
    #[serial]
    fn test_sub_command_parent_without_options() {
        fresh_bot();
        let plugin = Plugin::new("music").unwrap();
        plugin
            .slash_command(
                CommandOptions::new("play").option(OptionSpec::new("url", "Track URL")),
                noop(),
            )
            .unwrap();
        assert!(plugin
            .sub_command("play", CommandOptions::new("now"), noop())
            .is_err());
    }

    #[test]
    #[serial]
    fn test_sub_command_rejects_own_scope() {
        fresh_bot();
        let plugin = Plugin::new("music").unwrap();
        plugin.slash_command(CommandOptions::new("queue"), noop()).unwrap();

        let scoped = [
            CommandOptions::new("add").guild_ids([77]),
            CommandOptions::new("add").dm_permission(false),
            CommandOptions::new("add").default_member_permissions(Permissions::ADMINISTRATOR),
        ];
        for options in scoped {
            assert!(matches!(
                plugin.sub_command("queue", options, noop()),
                Err(PluginError::InvalidCommand { .. })
            ));
        }
        assert!(plugin.sub_commands_of("queue").is_empty());
    }

    #[test]
    #[serial]
    fn test_sub_command_limit() {
        fresh_bot();
        let plugin = Plugin::new("music").unwrap();
        plugin.slash_command(CommandOptions::new("queue"), noop()).unwrap();
        for i in 0..OPTION_LIMIT {
            plugin
                .sub_command("queue", CommandOptions::new(format!("s{i}")), noop())
                .unwrap();
        }
        assert!(plugin
            .sub_command("queue", CommandOptions::new("extra"), noop())
            .is_err());
    }

    #[test]
    #[serial]
    fn test_conflict_with_loaded_plugin() {
        fresh_bot();
        let first = Plugin::new("first").unwrap();
        first.slash_command(CommandOptions::new("ping"), noop()).unwrap();
        registry::load(&first).unwrap();

        let second = Plugin::new("second").unwrap();
        registry::load(&second).unwrap();
        assert_eq!(
            second.slash_command(CommandOptions::new("ping"), noop()).unwrap_err(),
            PluginError::CommandConflict {
                command: "ping".to_string(),
                owner: "first".to_string(),
            }
        );
        // Different command type does not clash
        second.message_command(CommandOptions::new("ping"), noop()).unwrap();
    }
}
