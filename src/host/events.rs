//! Serenity event handler wiring the host bot into the gateway
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use log::{error, info};
use serenity::async_trait;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;

use super::bot::Bot;

const ERROR_MESSAGE: &str = "❌ Sorry, I encountered an error processing your command. Please try again.";

/// Registers plugin commands on ready and dispatches application commands
pub struct PluginEventHandler {
    bot: Arc<Bot>,
}

impl PluginEventHandler {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl EventHandler for PluginEventHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());

        let loaded = self.bot.loaded();
        info!("🔌 {} plugins loaded", loaded.len());
        for plugin in &loaded {
            info!("   - {} ({} commands)", plugin.name, plugin.command_count);
        }

        if let Err(e) = self.bot.register_commands(&ctx).await {
            error!("❌ Failed to register plugin commands: {e}");
        } else {
            info!("✅ Plugin commands registered");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::ApplicationCommand(command) = interaction else {
            return;
        };

        if let Err(e) = self.bot.dispatch(&ctx, &command).await {
            error!(
                "Error handling command '{}': {}",
                command.data.name, e
            );

            // Handlers may already have deferred, so edit first and fall back to a new response
            if command
                .edit_original_interaction_response(&ctx.http, |response| {
                    response.content(ERROR_MESSAGE)
                })
                .await
                .is_err()
            {
                let _ = command
                    .create_interaction_response(&ctx.http, |response| {
                        response
                            .kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|message| {
                                message.content(ERROR_MESSAGE).ephemeral(true)
                            })
                    })
                    .await;
            }
        }
    }
}
