//! # Plugin Commands
//!
//! Command objects produced when a handler is attached to a plugin, and their
//! conversion into serenity registration builders.
//!
//! - **Version**: 1.3.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.4.0: Reject unknown option types, bad choices and over-limit option lists
//! - 1.3.0: Sub-commands fold into their parent as SubCommand options
//! - 1.2.0: Add guild id validation for untyped manifest values
//! - 1.1.0: Message and user context menu commands
//! - 1.0.0: Initial slash command definition

use serde_json::{json, Value};
use serenity::builder::{CreateApplicationCommand, CreateApplicationCommandOption};
use serenity::model::application::command::{CommandOptionType, CommandType};
use serenity::model::id::GuildId;
use serenity::model::permissions::Permissions;
use std::fmt;
use std::sync::Arc;

use super::handler::CommandHandler;
use crate::core::error::PluginError;

/// Discord limit for command and option names
pub const NAME_LIMIT: usize = 32;
/// Discord limit for command and option descriptions
pub const DESCRIPTION_LIMIT: usize = 100;
/// Discord limit for options per command, choices per option and sub-commands per parent
pub const OPTION_LIMIT: usize = 25;
/// Description used when a slash command does not supply one
pub const DEFAULT_DESCRIPTION: &str = "-";

/// Which plugin table a command lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Slash,
    SubCommand,
    Message,
    User,
}

impl CommandKind {
    /// Serenity command type this kind is registered as
    pub fn command_type(self) -> CommandType {
        match self {
            CommandKind::Slash | CommandKind::SubCommand => CommandType::ChatInput,
            CommandKind::Message => CommandType::Message,
            CommandKind::User => CommandType::User,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandKind::Slash => "slash command",
            CommandKind::SubCommand => "sub-command",
            CommandKind::Message => "message command",
            CommandKind::User => "user command",
        };
        f.write_str(label)
    }
}

/// Options accepted when attaching a handler to a plugin
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub name: String,
    pub description: Option<String>,
    /// None falls back to the plugin's default guilds, then to global registration
    pub guild_ids: Option<Vec<GuildId>>,
    pub dm_permission: Option<bool>,
    pub default_member_permissions: Option<Permissions>,
    pub options: Vec<OptionSpec>,
}

impl CommandOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn guild_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.guild_ids = Some(ids.into_iter().map(GuildId).collect());
        self
    }

    /// Guild ids from untyped values, e.g. a YAML or JSON list
    pub fn try_guild_ids(mut self, values: &[serde_json::Value]) -> Result<Self, PluginError> {
        self.guild_ids = Some(guild_ids_from_values(values)?);
        Ok(self)
    }

    pub fn dm_permission(mut self, allowed: bool) -> Self {
        self.dm_permission = Some(allowed);
        self
    }

    pub fn default_member_permissions(mut self, permissions: Permissions) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }
}

/// A single slash command parameter
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    /// Option type: string, integer, number, boolean, user, channel, role, mentionable, attachment
    pub option_type: String,
    pub required: bool,
    pub choices: Vec<Choice>,
}

/// A predefined choice for an option
#[derive(Debug, Clone)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            option_type: "string".to_string(),
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn kind(mut self, option_type: impl Into<String>) -> Self {
        self.option_type = option_type.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn choice(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.choices.push(Choice {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    fn validate(&self, command: &str) -> Result<(), PluginError> {
        if !is_chat_input_name(&self.name) {
            return Err(PluginError::invalid_command(
                command,
                format!("option name '{}' must be 1-32 lowercase characters", self.name),
            ));
        }
        check_description(command, &self.description)?;

        let kind = parse_option_type(&self.option_type).ok_or_else(|| {
            PluginError::invalid_command(
                command,
                format!("option '{}' has unknown type '{}'", self.name, self.option_type),
            )
        })?;

        if self.choices.is_empty() {
            return Ok(());
        }
        if self.choices.len() > OPTION_LIMIT {
            return Err(PluginError::invalid_command(
                command,
                format!("option '{}' has more than {OPTION_LIMIT} choices", self.name),
            ));
        }
        if !matches!(
            kind,
            CommandOptionType::String | CommandOptionType::Integer | CommandOptionType::Number
        ) {
            return Err(PluginError::invalid_command(
                command,
                format!("option '{}' of type '{}' cannot have choices", self.name, self.option_type),
            ));
        }
        for choice in &self.choices {
            let len = choice.name.chars().count();
            if len == 0 || len > DESCRIPTION_LIMIT {
                return Err(PluginError::invalid_command(
                    command,
                    format!("choice names of option '{}' must be 1-100 characters", self.name),
                ));
            }
            choice_value(kind, &choice.value).ok_or_else(|| {
                PluginError::invalid_command(
                    command,
                    format!(
                        "choice '{}' of option '{}' is not a valid {}",
                        choice.value, self.name, self.option_type
                    ),
                )
            })?;
        }
        Ok(())
    }

    fn to_builder(&self) -> CreateApplicationCommandOption {
        let kind = parse_option_type(&self.option_type).unwrap_or(CommandOptionType::String);
        let mut option = CreateApplicationCommandOption::default();
        option
            .name(&self.name)
            .description(&self.description)
            .kind(kind)
            .required(self.required);

        // add_int_choice only takes i32, so choices are written as raw JSON
        let choices: Vec<Value> = self
            .choices
            .iter()
            .filter_map(|choice| {
                choice_value(kind, &choice.value)
                    .map(|value| json!({ "name": choice.name, "value": value }))
            })
            .collect();
        if !choices.is_empty() {
            option.0.insert("choices", Value::Array(choices));
        }

        option
    }
}

/// Typed JSON value of a choice, None if it does not parse for the option type
fn choice_value(kind: CommandOptionType, raw: &str) -> Option<Value> {
    match kind {
        CommandOptionType::Integer => raw.parse::<i64>().ok().map(Value::from),
        CommandOptionType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|val| val.is_finite())
            .map(Value::from),
        _ => Some(Value::from(raw)),
    }
}

/// A handler bound to a plugin under a command name
pub struct Command {
    kind: CommandKind,
    name: String,
    parent: Option<String>,
    description: String,
    guild_ids: Option<Vec<GuildId>>,
    dm_permission: Option<bool>,
    default_member_permissions: Option<Permissions>,
    options: Vec<OptionSpec>,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Validate options against Discord naming rules and build the command
    pub(crate) fn new(
        kind: CommandKind,
        parent: Option<&str>,
        options: CommandOptions,
        default_guild_ids: Option<&[GuildId]>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Self, PluginError> {
        let CommandOptions {
            name,
            description,
            guild_ids,
            dm_permission,
            default_member_permissions,
            options,
        } = options;

        let description = match kind {
            CommandKind::Slash | CommandKind::SubCommand => {
                if !is_chat_input_name(&name) {
                    return Err(PluginError::invalid_command(
                        &name,
                        "name must be 1-32 lowercase characters, digits, '-' or '_'",
                    ));
                }
                let description = description.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
                check_description(&name, &description)?;
                if options.len() > OPTION_LIMIT {
                    return Err(PluginError::invalid_command(
                        &name,
                        format!("more than {OPTION_LIMIT} options"),
                    ));
                }
                for option in &options {
                    option.validate(&name)?;
                }
                if let Some(pair) = options.windows(2).find(|pair| !pair[0].required && pair[1].required) {
                    return Err(PluginError::invalid_command(
                        &name,
                        format!(
                            "required option '{}' follows optional option '{}'",
                            pair[1].name, pair[0].name
                        ),
                    ));
                }
                description
            }
            CommandKind::Message | CommandKind::User => {
                let len = name.chars().count();
                if name.trim().is_empty() || len > NAME_LIMIT {
                    return Err(PluginError::invalid_command(
                        &name,
                        "context menu names must be 1-32 characters",
                    ));
                }
                if !options.is_empty() {
                    return Err(PluginError::invalid_command(
                        &name,
                        "context menu commands take no options",
                    ));
                }
                String::new()
            }
        };

        if let Some(ids) = &guild_ids {
            check_guild_ids(ids)?;
        }

        Ok(Self {
            kind,
            name,
            parent: parent.map(str::to_string),
            description,
            guild_ids: guild_ids.or_else(|| default_guild_ids.map(<[GuildId]>::to_vec)),
            dm_permission,
            default_member_permissions,
            options,
            handler,
        })
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Table key: `"parent sub"` for sub-commands, the plain name otherwise
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent} {}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Guilds this command is limited to; None means global
    pub fn guild_ids(&self) -> Option<&[GuildId]> {
        self.guild_ids.as_deref()
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    /// Build the serenity registration payload, folding in any sub-commands
    pub fn to_application_command(&self, subs: &[Arc<Command>]) -> CreateApplicationCommand {
        let mut cmd = CreateApplicationCommand::default();
        cmd.name(&self.name).kind(self.kind.command_type());

        if self.kind == CommandKind::Slash {
            cmd.description(&self.description);
        }
        if let Some(allowed) = self.dm_permission {
            cmd.dm_permission(allowed);
        }
        if let Some(permissions) = self.default_member_permissions {
            cmd.default_member_permissions(permissions);
        }

        if subs.is_empty() {
            for option in &self.options {
                cmd.add_option(option.to_builder());
            }
        } else {
            for sub in subs {
                cmd.add_option(sub.to_sub_option());
            }
        }

        cmd
    }

    fn to_sub_option(&self) -> CreateApplicationCommandOption {
        let mut sub = CreateApplicationCommandOption::default();
        sub.name(&self.name)
            .description(&self.description)
            .kind(CommandOptionType::SubCommand);
        for option in &self.options {
            sub.add_sub_option(option.to_builder());
        }
        sub
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("name", &self.qualified_name())
            .field("guild_ids", &self.guild_ids)
            .finish_non_exhaustive()
    }
}

/// Convert untyped guild id values, rejecting anything that is not a positive integer
pub fn guild_ids_from_values(values: &[serde_json::Value]) -> Result<Vec<GuildId>, PluginError> {
    values
        .iter()
        .map(|value| match value.as_u64() {
            Some(id) if id > 0 => Ok(GuildId(id)),
            _ => Err(PluginError::InvalidGuildIds(value.to_string())),
        })
        .collect()
}

fn check_guild_ids(ids: &[GuildId]) -> Result<(), PluginError> {
    match ids.iter().find(|id| id.0 == 0) {
        Some(id) => Err(PluginError::InvalidGuildIds(id.0.to_string())),
        None => Ok(()),
    }
}

fn check_description(command: &str, description: &str) -> Result<(), PluginError> {
    let len = description.chars().count();
    if len == 0 || len > DESCRIPTION_LIMIT {
        return Err(PluginError::invalid_command(
            command,
            "description must be 1-100 characters",
        ));
    }
    Ok(())
}

/// Lowercase letters, digits, '-' and '_', 1-32 characters
fn is_chat_input_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=NAME_LIMIT).contains(&len)
        && name
            .chars()
            .all(|c| c == '-' || c == '_' || c.is_numeric() || (c.is_alphabetic() && !c.is_uppercase()))
}

/// Parse option type string to Discord CommandOptionType
fn parse_option_type(type_str: &str) -> Option<CommandOptionType> {
    let kind = match type_str.to_lowercase().as_str() {
        "string" => CommandOptionType::String,
        "integer" => CommandOptionType::Integer,
        "boolean" => CommandOptionType::Boolean,
        "user" => CommandOptionType::User,
        "channel" => CommandOptionType::Channel,
        "role" => CommandOptionType::Role,
        "mentionable" => CommandOptionType::Mentionable,
        "number" => CommandOptionType::Number,
        "attachment" => CommandOptionType::Attachment,
        _ => return None,
    };
    Some(kind)
}
