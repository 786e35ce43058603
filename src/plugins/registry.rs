//! Process-wide plugin registry
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: load/unload forward to the bound bot
//! - 1.0.0: Initial name -> plugin table with init()

use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::plugin::Plugin;
use crate::core::error::PluginError;
use crate::host::Bot;

/// Registered plugins and the bot they are loaded into
#[derive(Default)]
struct PluginRegistry {
    bot: Option<Arc<Bot>>,
    plugins: HashMap<String, Arc<Plugin>>,
}

static REGISTRY: Lazy<RwLock<PluginRegistry>> =
    Lazy::new(|| RwLock::new(PluginRegistry::default()));

// A panic while holding the lock leaves the maps consistent, so poisoning is ignored
fn read() -> RwLockReadGuard<'static, PluginRegistry> {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner)
}

fn write() -> RwLockWriteGuard<'static, PluginRegistry> {
    REGISTRY.write().unwrap_or_else(PoisonError::into_inner)
}

/// Clear every registered plugin and bind `bot` as the host for later loads
///
/// Must be called before any [`Plugin`] is constructed.
pub fn init(bot: Arc<Bot>) {
    let mut registry = write();
    let cleared = registry.plugins.len();
    registry.plugins.clear();
    registry.bot = Some(bot);
    info!("Plugin registry initialized ({cleared} previous plugin(s) cleared)");
}

/// Whether [`init`] has been called
pub fn is_initialized() -> bool {
    read().bot.is_some()
}

/// The bot bound by the last [`init`] call
pub fn bot() -> Option<Arc<Bot>> {
    read().bot.clone()
}

/// Look up a registered plugin by name
pub fn get(name: &str) -> Option<Arc<Plugin>> {
    read().plugins.get(name).cloned()
}

/// Names of all registered plugins, sorted
pub fn names() -> Vec<String> {
    let mut names: Vec<String> = read().plugins.keys().cloned().collect();
    names.sort();
    names
}

/// Record a freshly constructed plugin; names are unique until the next init()
pub(crate) fn register(plugin: Arc<Plugin>) -> Result<Arc<Plugin>, PluginError> {
    let mut registry = write();
    if registry.bot.is_none() {
        return Err(PluginError::NotInitialized);
    }
    if registry.plugins.contains_key(plugin.name()) {
        return Err(PluginError::DuplicateName(plugin.name().to_string()));
    }
    registry
        .plugins
        .insert(plugin.name().to_string(), Arc::clone(&plugin));
    debug!("Registered plugin '{}'", plugin.name());
    Ok(plugin)
}

/// Load a plugin into the bound bot
///
/// Fails if a plugin with the same name is already loaded, or if a different
/// plugin object has claimed the name in the registry.
pub fn load(plugin: &Arc<Plugin>) -> Result<(), PluginError> {
    let mut registry = write();
    let bot = registry.bot.clone().ok_or(PluginError::NotInitialized)?;
    let name = plugin.name();

    if bot.is_loaded(name) {
        return Err(PluginError::AlreadyLoaded(name.to_string()));
    }
    if let Some(existing) = registry.plugins.get(name) {
        if !Arc::ptr_eq(existing, plugin) {
            return Err(PluginError::DuplicateName(name.to_string()));
        }
    }

    bot.add_plugin(Arc::clone(plugin))?;
    registry
        .plugins
        .entry(name.to_string())
        .or_insert_with(|| Arc::clone(plugin));
    Ok(())
}

/// Unload a plugin by name, removing it from both the bot and the registry
pub fn unload(name: &str) -> Result<Arc<Plugin>, PluginError> {
    let mut registry = write();
    let bot = registry
        .bot
        .clone()
        .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;

    let plugin = bot.remove_plugin(name)?;
    // After a re-init the name may belong to a newer plugin
    if registry
        .plugins
        .get(name)
        .is_some_and(|registered| Arc::ptr_eq(registered, &plugin))
    {
        registry.plugins.remove(name);
    }
    Ok(plugin)
}

#[cfg(test)]
pub(crate) fn reset() {
    let mut registry = write();
    registry.plugins.clear();
    registry.bot = None;
}
