//! # Host Bot
//!
//! Owns the loaded plugins, turns their command tables into serenity
//! registrations and routes application command interactions back to them.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.1: Routing split from dispatch so handler order is inspectable
//! - 1.2.0: Development guilds override per-command guild ids
//! - 1.1.0: Sub-command dispatch runs the parent handler first
//! - 1.0.0: Initial plugin table, registration and dispatch

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::{
    Command as ApplicationCommand, CommandOptionType, CommandType,
};
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandData,
};
use serenity::model::id::GuildId;
use serenity::prelude::Context;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::commands::{Command, CommandHandler};
use crate::core::error::PluginError;
use crate::plugins::Plugin;

/// Host-level settings
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    /// When non-empty, every command is registered only in these guilds
    pub test_guilds: Vec<GuildId>,
}

/// Summary of a loaded plugin
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub name: String,
    pub loaded_at: DateTime<Utc>,
    pub command_count: usize,
}

/// Registration payloads split by scope
#[derive(Debug, Default)]
pub struct CommandSet {
    pub global: Vec<CreateApplicationCommand>,
    pub guilds: BTreeMap<GuildId, Vec<CreateApplicationCommand>>,
}

impl CommandSet {
    /// Total payloads across all scopes
    pub fn len(&self) -> usize {
        self.global.len() + self.guilds.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Command found for an incoming interaction
#[derive(Debug, Clone)]
pub struct Resolved {
    pub plugin: Arc<Plugin>,
    pub command: Arc<Command>,
    /// Set when `command` is a sub-command
    pub parent: Option<Arc<Command>>,
}

impl Resolved {
    /// Handlers in invocation order, the parent's first for a sub-command
    pub fn handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.parent
            .iter()
            .chain(std::iter::once(&self.command))
            .map(|command| Arc::clone(command.handler()))
            .collect()
    }
}

struct Slot {
    plugin: Arc<Plugin>,
    loaded_at: DateTime<Utc>,
}

/// The running bot that plugins are loaded into
pub struct Bot {
    config: BotConfig,
    plugins: DashMap<String, Slot>,
}

impl Default for Bot {
    fn default() -> Self {
        Self::new(BotConfig::default())
    }
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            plugins: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        self.plugins.get(name).map(|slot| Arc::clone(&slot.plugin))
    }

    /// Loaded plugins sorted by name
    pub fn loaded(&self) -> Vec<LoadedPlugin> {
        let mut loaded: Vec<LoadedPlugin> = self
            .plugins
            .iter()
            .map(|slot| LoadedPlugin {
                name: slot.key().clone(),
                loaded_at: slot.loaded_at,
                command_count: slot.plugin.command_count(),
            })
            .collect();
        loaded.sort_by(|a, b| a.name.cmp(&b.name));
        loaded
    }

    fn sorted_plugins(&self) -> Vec<Arc<Plugin>> {
        let mut plugins: Vec<Arc<Plugin>> = self
            .plugins
            .iter()
            .map(|slot| Arc::clone(&slot.plugin))
            .collect();
        plugins.sort_by(|a, b| a.name().cmp(b.name()));
        plugins
    }

    /// Name of the loaded plugin that provides a top-level command, skipping `except`
    pub fn command_owner(
        &self,
        command_type: CommandType,
        name: &str,
        except: Option<&str>,
    ) -> Option<String> {
        self.plugins
            .iter()
            .filter(|slot| Some(slot.key().as_str()) != except)
            .find(|slot| slot.plugin.provides(command_type, name))
            .map(|slot| slot.key().clone())
    }

    /// Load a plugin, rejecting duplicates and command names another plugin owns
    pub fn add_plugin(&self, plugin: Arc<Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();

        let top_level = [
            (CommandType::ChatInput, plugin.slash_commands().names()),
            (CommandType::Message, plugin.message_commands().names()),
            (CommandType::User, plugin.user_commands().names()),
        ];
        for (command_type, names) in &top_level {
            for command in names {
                if let Some(owner) = self.command_owner(*command_type, command, Some(&name)) {
                    return Err(PluginError::CommandConflict {
                        command: command.clone(),
                        owner,
                    });
                }
            }
        }

        match self.plugins.entry(name.clone()) {
            Entry::Occupied(_) => Err(PluginError::AlreadyLoaded(name)),
            Entry::Vacant(slot) => {
                info!(
                    "🔌 Loaded plugin '{name}' ({} commands)",
                    plugin.command_count()
                );
                slot.insert(Slot {
                    plugin,
                    loaded_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Unload a plugin by name
    pub fn remove_plugin(&self, name: &str) -> Result<Arc<Plugin>, PluginError> {
        match self.plugins.remove(name) {
            Some((_, slot)) => {
                info!("Unloaded plugin '{name}'");
                Ok(slot.plugin)
            }
            None => Err(PluginError::NotLoaded(name.to_string())),
        }
    }

    fn targets(&self, command: &Command) -> Option<Vec<GuildId>> {
        if !self.config.test_guilds.is_empty() {
            return Some(self.config.test_guilds.clone());
        }
        command.guild_ids().map(<[GuildId]>::to_vec)
    }

    /// Build registration payloads for every loaded plugin
    pub fn build_commands(&self) -> CommandSet {
        let mut set = CommandSet::default();

        for plugin in self.sorted_plugins() {
            let top_level = plugin
                .slash_commands()
                .commands()
                .into_iter()
                .chain(plugin.message_commands().commands())
                .chain(plugin.user_commands().commands());

            for command in top_level {
                let subs = plugin.sub_commands_of(command.name());
                let payload = command.to_application_command(&subs);

                match self.targets(&command) {
                    Some(guilds) => {
                        for guild_id in guilds {
                            set.guilds.entry(guild_id).or_default().push(payload.clone());
                        }
                    }
                    None => set.global.push(payload),
                }
            }
        }

        set
    }

    /// Push all plugin commands to Discord
    ///
    /// Global commands are only overwritten outside development mode, so test
    /// guild registrations never clear the production set.
    pub async fn register_commands(&self, ctx: &Context) -> Result<()> {
        let CommandSet { global, guilds } = self.build_commands();

        if self.config.test_guilds.is_empty() {
            let count = global.len();
            ApplicationCommand::set_global_application_commands(&ctx.http, |commands| {
                for command in global {
                    commands.add_application_command(command);
                }
                commands
            })
            .await?;
            info!("Global commands registered ({count} commands, may take up to 1 hour to propagate)");
        }

        for (guild_id, payloads) in guilds {
            let count = payloads.len();
            guild_id
                .set_application_commands(&ctx.http, |commands| {
                    for command in payloads {
                        commands.add_application_command(command);
                    }
                    commands
                })
                .await?;
            info!("Guild commands registered for guild {guild_id} ({count} commands)");
        }

        Ok(())
    }

    /// Find the plugin command for a command type, name and optional sub-command
    pub fn resolve(
        &self,
        command_type: CommandType,
        name: &str,
        sub: Option<&str>,
    ) -> Option<Resolved> {
        let plugin = self.plugin(&self.command_owner(command_type, name, None)?)?;

        let resolved = match (command_type, sub) {
            (CommandType::ChatInput, Some(sub)) => {
                let parent = plugin.slash_commands().get(name)?;
                let command = plugin.groups().get(&format!("{name} {sub}"))?;
                Resolved {
                    plugin,
                    command,
                    parent: Some(parent),
                }
            }
            (CommandType::ChatInput, None) => {
                let command = plugin.slash_commands().get(name)?;
                Resolved {
                    plugin,
                    command,
                    parent: None,
                }
            }
            (CommandType::Message, _) => {
                let command = plugin.message_commands().get(name)?;
                Resolved {
                    plugin,
                    command,
                    parent: None,
                }
            }
            (CommandType::User, _) => {
                let command = plugin.user_commands().get(name)?;
                Resolved {
                    plugin,
                    command,
                    parent: None,
                }
            }
            _ => return None,
        };

        Some(resolved)
    }

    /// Route an interaction to its plugin handler
    ///
    /// Returns `Ok(false)` when no loaded plugin provides the command.
    pub fn route(&self, data: &CommandData) -> Option<Resolved> {
        let sub = data
            .options
            .first()
            .filter(|option| option.kind == CommandOptionType::SubCommand)
            .map(|option| option.name.as_str());
        self.resolve(data.kind, &data.name, sub)
    }

    pub async fn dispatch(
        &self,
        ctx: &Context,
        interaction: &ApplicationCommandInteraction,
    ) -> Result<bool> {
        let Some(resolved) = self.route(&interaction.data) else {
            warn!("No plugin provides command '{}'", interaction.data.name);
            return Ok(false);
        };

        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] /{} -> plugin '{}' | User: {}",
            resolved.command.qualified_name(),
            resolved.plugin.name(),
            interaction.user.id
        );

        for handler in resolved.handlers() {
            handler
                .handle(Arc::clone(&resolved.plugin), ctx, interaction)
                .await?;
        }

        debug!("[{request_id}] Command completed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handler::same_handler;
    use crate::commands::{handler_fn, CommandHandler, CommandOptions};
    use crate::plugins::registry;
    use serde_json::json;
    use serial_test::serial;

    fn command_data(value: serde_json::Value) -> CommandData {
        serde_json::from_value(value).unwrap()
    }

    fn noop() -> Arc<dyn CommandHandler> {
        handler_fn(|_, _, _| async { Ok(()) })
    }

    fn plugin_with(name: &str, slash: &[&str]) -> Arc<Plugin> {
        let plugin = Arc::new(Plugin::detached(name));
        for command in slash {
            plugin
                .slash_command(CommandOptions::new(*command), noop())
                .unwrap();
        }
        plugin
    }

    fn payload_names(payloads: &[CreateApplicationCommand]) -> Vec<String> {
        payloads
            .iter()
            .map(|p| p.0.get("name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    #[serial]
    fn test_add_and_remove_plugin() {
        registry::reset();
        let bot = Bot::default();
        let plugin = plugin_with("utility", &["ping"]);

        bot.add_plugin(Arc::clone(&plugin)).unwrap();
        assert!(bot.is_loaded("utility"));
        assert_eq!(
            bot.add_plugin(Arc::clone(&plugin)).unwrap_err(),
            PluginError::AlreadyLoaded("utility".to_string())
        );

        let loaded = bot.loaded();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "utility");
        assert_eq!(loaded[0].command_count, 1);

        bot.remove_plugin("utility").unwrap();
        assert!(!bot.is_loaded("utility"));
        assert_eq!(
            bot.remove_plugin("utility").unwrap_err(),
            PluginError::NotLoaded("utility".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_add_plugin_conflict() {
        registry::reset();
        let bot = Bot::default();
        bot.add_plugin(plugin_with("first", &["ping"])).unwrap();

        let err = bot
            .add_plugin(plugin_with("second", &["status", "ping"]))
            .unwrap_err();
        assert_eq!(
            err,
            PluginError::CommandConflict {
                command: "ping".to_string(),
                owner: "first".to_string(),
            }
        );
        assert!(!bot.is_loaded("second"));
    }

    #[test]
    #[serial]
    fn test_build_commands_scopes() {
        registry::reset();
        let bot = Bot::default();
        let plugin = Arc::new(Plugin::detached("mixed"));
        plugin
            .slash_command(CommandOptions::new("global_cmd"), noop())
            .unwrap();
        plugin
            .slash_command(CommandOptions::new("guild_cmd").guild_ids([1, 2]), noop())
            .unwrap();
        plugin
            .message_command(CommandOptions::new("Quote"), noop())
            .unwrap();
        bot.add_plugin(plugin).unwrap();

        let set = bot.build_commands();
        assert_eq!(payload_names(&set.global), vec!["global_cmd", "Quote"]);
        assert_eq!(payload_names(&set.guilds[&GuildId(1)]), vec!["guild_cmd"]);
        assert_eq!(payload_names(&set.guilds[&GuildId(2)]), vec!["guild_cmd"]);
        assert_eq!(set.len(), 4);
    }

    #[test]
    #[serial]
    fn test_build_commands_test_guilds() {
        registry::reset();
        let bot = Bot::new(BotConfig {
            test_guilds: vec![GuildId(99)],
        });
        let plugin = Arc::new(Plugin::detached("dev"));
        plugin
            .slash_command(CommandOptions::new("ping"), noop())
            .unwrap();
        plugin
            .slash_command(CommandOptions::new("scoped").guild_ids([5]), noop())
            .unwrap();
        bot.add_plugin(plugin).unwrap();

        let set = bot.build_commands();
        assert!(set.global.is_empty());
        assert_eq!(set.guilds.len(), 1);
        assert_eq!(payload_names(&set.guilds[&GuildId(99)]), vec!["ping", "scoped"]);
    }

    #[test]
    #[serial]
    fn test_sub_commands_registered_under_parent() {
        registry::reset();
        let bot = Bot::default();
        let plugin = plugin_with("music", &["queue"]);
        plugin
            .sub_command("queue", CommandOptions::new("add"), noop())
            .unwrap();
        plugin
            .sub_command("queue", CommandOptions::new("clear"), noop())
            .unwrap();
        bot.add_plugin(plugin).unwrap();

        let set = bot.build_commands();
        assert_eq!(payload_names(&set.global), vec!["queue"]);
        let options = set.global[0].0.get("options").unwrap().as_array().unwrap();
        assert_eq!(options.len(), 2);
    }

    #[test]
    #[serial]
    fn test_resolve() {
        registry::reset();
        let bot = Bot::default();
        let plugin = plugin_with("music", &["queue", "play"]);
        plugin
            .sub_command("queue", CommandOptions::new("add"), noop())
            .unwrap();
        plugin
            .user_command(CommandOptions::new("Listening"), noop())
            .unwrap();
        bot.add_plugin(plugin).unwrap();

        let play = bot.resolve(CommandType::ChatInput, "play", None).unwrap();
        assert_eq!(play.plugin.name(), "music");
        assert_eq!(play.command.name(), "play");
        assert!(play.parent.is_none());

        let add = bot
            .resolve(CommandType::ChatInput, "queue", Some("add"))
            .unwrap();
        assert_eq!(add.command.qualified_name(), "queue add");
        assert_eq!(add.parent.unwrap().name(), "queue");

        assert!(bot
            .resolve(CommandType::ChatInput, "queue", Some("remove"))
            .is_none());
        assert!(bot.resolve(CommandType::User, "Listening", None).is_some());
        assert!(bot.resolve(CommandType::Message, "Listening", None).is_none());
        assert!(bot.resolve(CommandType::ChatInput, "missing", None).is_none());
    }

    #[test]
    #[serial]
    fn test_sub_command_runs_after_parent() {
        registry::reset();
        let bot = Bot::default();
        let plugin = Arc::new(Plugin::detached("music"));
        let parent_handler = noop();
        let add_handler = noop();
        plugin
            .slash_command(CommandOptions::new("queue"), Arc::clone(&parent_handler))
            .unwrap();
        plugin
            .sub_command("queue", CommandOptions::new("add"), Arc::clone(&add_handler))
            .unwrap();
        bot.add_plugin(plugin).unwrap();

        let resolved = bot
            .route(&command_data(json!({
                "id": "1",
                "name": "queue",
                "type": 1,
                "options": [{ "name": "add", "type": 1, "options": [] }]
            })))
            .unwrap();
        let handlers = resolved.handlers();
        assert_eq!(handlers.len(), 2);
        assert!(same_handler(&handlers[0], &parent_handler));
        assert!(same_handler(&handlers[1], &add_handler));

        let parent_only = bot
            .route(&command_data(json!({ "id": "2", "name": "queue", "type": 1 })))
            .unwrap();
        let handlers = parent_only.handlers();
        assert_eq!(handlers.len(), 1);
        assert!(same_handler(&handlers[0], &parent_handler));
    }

    #[test]
    #[serial]
    fn test_unknown_command_is_not_routed() {
        registry::reset();
        let bot = Bot::default();
        bot.add_plugin(plugin_with("music", &["queue"])).unwrap();

        // dispatch answers Ok(false) for anything route cannot place
        assert!(bot
            .route(&command_data(json!({ "id": "3", "name": "missing", "type": 1 })))
            .is_none());
        assert!(bot
            .route(&command_data(json!({
                "id": "4",
                "name": "queue",
                "type": 1,
                "options": [{ "name": "remove", "type": 1, "options": [] }]
            })))
            .is_none());
        assert!(bot
            .route(&command_data(json!({ "id": "5", "name": "queue", "type": 3 })))
            .is_none());
    }
}
