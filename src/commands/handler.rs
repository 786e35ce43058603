//! Command handler trait and closure adapter
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Handlers receive their owning plugin; add handler_fn for async closures
//! - 1.0.0: Initial implementation for modular command handling

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::prelude::Context;
use std::future::Future;
use std::sync::Arc;

use crate::plugins::Plugin;

/// Callback attached to a plugin command
///
/// Implementations are shared behind `Arc<dyn CommandHandler>`; attaching the
/// same `Arc` to a second command of a plugin is rejected.
///
/// # Example
///
/// ```ignore
/// pub struct PingHandler;
///
/// #[async_trait]
/// impl CommandHandler for PingHandler {
///     async fn handle(
///         &self,
///         plugin: Arc<Plugin>,
///         ctx: &Context,
///         command: &ApplicationCommandInteraction,
///     ) -> Result<()> {
///         // Respond to the interaction
///         Ok(())
///     }
/// }
///
/// plugin.slash_command(CommandOptions::new("ping"), Arc::new(PingHandler))?;
/// ```
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle the application command
    ///
    /// # Arguments
    ///
    /// * `plugin` - The plugin that owns the invoked command
    /// * `ctx` - Serenity context for Discord API calls
    /// * `command` - The application command interaction to handle
    async fn handle(
        &self,
        plugin: Arc<Plugin>,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()>;
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    callback: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Arc<Plugin>, Context, ApplicationCommandInteraction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(
        &self,
        plugin: Arc<Plugin>,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        (self.callback)(plugin, ctx.clone(), command.clone()).await
    }
}

/// Wrap an async closure as a shareable command handler
///
/// The closure gets owned copies of the context and interaction so the
/// returned future does not borrow from the dispatcher.
pub fn handler_fn<F, Fut>(callback: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Arc<Plugin>, Context, ApplicationCommandInteraction) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { callback })
}

/// Identity comparison of two handler pointers, ignoring vtables
pub(crate) fn same_handler(a: &Arc<dyn CommandHandler>, b: &Arc<dyn CommandHandler>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
