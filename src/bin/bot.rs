use anyhow::Result;
use async_trait::async_trait;
use dotenvy::dotenv;
use log::{error, info};
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption, ResolvedTarget,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::*;
use std::sync::{Arc, Weak};

use serenity_plugins::commands::{handler_fn, CommandHandler, CommandOptions, OptionSpec};
use serenity_plugins::core::{Config, PluginManifest};
use serenity_plugins::host::{Bot, BotConfig, PluginEventHandler};
use serenity_plugins::plugins::{self, Plugin, PluginBuilder};

async fn respond(ctx: &Context, command: &ApplicationCommandInteraction, text: &str) -> Result<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(text))
        })
        .await?;
    Ok(())
}

/// Look up a string argument of the invoked sub-command
fn sub_option(command: &ApplicationCommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .first()
        .map(|sub| sub.options.as_slice())
        .unwrap_or_default()
        .iter()
        .find(|opt: &&CommandDataOption| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_str())
        .map(str::to_string)
}

struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(
        &self,
        plugin: Arc<Plugin>,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        respond(ctx, command, &format!("🏓 Pong! (served by `{plugin}`)")).await
    }
}

/// Holds the bot weakly, since the bot owns the plugin that owns this handler
struct PluginListHandler {
    bot: Weak<Bot>,
}

impl PluginListHandler {
    fn new(bot: &Arc<Bot>) -> Self {
        Self {
            bot: Arc::downgrade(bot),
        }
    }

    fn listing(&self) -> String {
        let Some(bot) = self.bot.upgrade() else {
            return "⚠️ The bot is shutting down".to_string();
        };
        let lines: Vec<String> = bot
            .loaded()
            .iter()
            .map(|p| {
                format!(
                    "• **{}** - {} commands, loaded <t:{}:R>",
                    p.name,
                    p.command_count,
                    p.loaded_at.timestamp()
                )
            })
            .collect();
        format!("🔌 **Loaded plugins**\n{}", lines.join("\n"))
    }
}

#[async_trait]
impl CommandHandler for PluginListHandler {
    async fn handle(
        &self,
        _plugin: Arc<Plugin>,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        respond(ctx, command, &self.listing()).await
    }
}

/// Manifest values override the defaults already on `builder`
fn apply_manifest(manifest: &PluginManifest, builder: PluginBuilder, name: &str) -> Result<PluginBuilder> {
    Ok(match manifest.enabled_entry(name) {
        Some(entry) => entry.apply(builder)?,
        None => builder,
    })
}

fn utility_plugin(manifest: &PluginManifest, bot: &Arc<Bot>) -> Result<Arc<Plugin>> {
    let defaults = Plugin::builder("utility").state("category", "General");
    let plugin = apply_manifest(manifest, defaults, "utility")?.build()?;

    plugin.slash_command(
        CommandOptions::new("ping").description("Check that the bot is alive"),
        Arc::new(PingHandler),
    )?;
    plugin.slash_command(
        CommandOptions::new("plugins").description("List loaded plugins"),
        Arc::new(PluginListHandler::new(bot)),
    )?;

    // Parent of the settings sub-commands; nothing to do before they run
    plugin.slash_command(
        CommandOptions::new("settings")
            .description("Inspect or change plugin state")
            .dm_permission(false),
        handler_fn(|_, _, _| async { Ok(()) }),
    )?;
    plugin.sub_command(
        "settings",
        CommandOptions::new("show").description("Show the utility plugin state"),
        handler_fn(|plugin, ctx, command| async move {
            let mut entries: Vec<String> = plugin
                .state()
                .into_iter()
                .map(|(key, value)| format!("`{key}` = `{value}`"))
                .collect();
            entries.sort();
            let text = if entries.is_empty() {
                "No state set".to_string()
            } else {
                entries.join("\n")
            };
            respond(&ctx, &command, &text).await
        }),
    )?;
    plugin.sub_command(
        "settings",
        CommandOptions::new("set")
            .description("Set a state value")
            .option(OptionSpec::new("key", "State key").required(true))
            .option(OptionSpec::new("value", "New value").required(true)),
        handler_fn(|plugin, ctx, command| async move {
            let key = sub_option(&command, "key").unwrap_or_default();
            let value = sub_option(&command, "value").unwrap_or_default();
            let previous = plugin.set_state(key.clone(), value.clone());
            let text = match previous {
                Some(old) => format!("Updated `{key}`: `{old}` → `{value}`"),
                None => format!("Set `{key}` = `{value}`"),
            };
            respond(&ctx, &command, &text).await
        }),
    )?;

    Ok(plugin)
}

fn tools_plugin(manifest: &PluginManifest) -> Result<Arc<Plugin>> {
    let defaults = Plugin::builder("tools").state("category", "Tools");
    let plugin = apply_manifest(manifest, defaults, "tools")?.build()?;

    plugin.message_command(
        CommandOptions::new("Quote Message"),
        handler_fn(|_, ctx, command| async move {
            let text = match command.data.target() {
                Some(ResolvedTarget::Message(message)) => {
                    format!("> {}\n— {}", message.content, message.author.name)
                }
                _ => "Could not resolve the message".to_string(),
            };
            respond(&ctx, &command, &text).await
        }),
    )?;
    plugin.user_command(
        CommandOptions::new("Inspect User"),
        handler_fn(|_, ctx, command| async move {
            let text = match command.data.target() {
                Some(ResolvedTarget::User(user, _)) => format!(
                    "**{}** (`{}`), account created <t:{}:R>",
                    user.name,
                    user.id,
                    user.created_at().unix_timestamp()
                ),
                _ => "Could not resolve the user".to_string(),
            };
            respond(&ctx, &command, &text).await
        }),
    )?;

    Ok(plugin)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting plugin bot...");

    let manifest = if std::path::Path::new(&config.plugins_config_path).exists() {
        let manifest = PluginManifest::load(&config.plugins_config_path)?;
        info!(
            "📄 Loaded {} plugin entries from {}",
            manifest.plugins.len(),
            config.plugins_config_path
        );
        manifest
    } else {
        info!(
            "📄 No manifest at {} - plugins start with default state",
            config.plugins_config_path
        );
        PluginManifest::empty()
    };

    let bot = Arc::new(Bot::new(BotConfig {
        test_guilds: config.discord_guild_id.into_iter().collect(),
    }));
    plugins::init(Arc::clone(&bot));

    for plugin in [utility_plugin(&manifest, &bot)?, tools_plugin(&manifest)?] {
        let disabled = manifest.entry(plugin.name()).is_some_and(|e| !e.enabled);
        if disabled {
            info!("Plugin '{plugin}' disabled in manifest, not loading");
            continue;
        }
        plugins::load(&plugin)?;
    }

    let intents = GatewayIntents::GUILDS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(PluginEventHandler::new(bot))
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
