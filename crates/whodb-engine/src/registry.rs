use std::sync::Arc;

use tracing::info;

use whodb_core::{Error, Result};
use whodb_plugins::{Plugin, PluginDescriptor};

/// Plugins keyed by `(category, store type)`.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<(PluginDescriptor, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own descriptor; a store type may be claimed once.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let descriptor = plugin.descriptor();
        if self
            .entries
            .iter()
            .any(|(existing, _)| existing.store_type.eq_ignore_ascii_case(&descriptor.store_type))
        {
            return Err(Error::Unsupported(format!(
                "store type '{}' is already registered",
                descriptor.store_type
            )));
        }
        info!(
            event = "registry.register",
            category = %descriptor.category,
            store_type = %descriptor.store_type
        );
        self.entries.push((descriptor, plugin));
        Ok(())
    }

    /// Resolve the plugin for a store type (case-insensitive).
    pub fn choose(&self, store_type: &str) -> Result<Arc<dyn Plugin>> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.store_type.eq_ignore_ascii_case(store_type))
            .map(|(_, plugin)| Arc::clone(plugin))
            .ok_or_else(|| Error::NotFound(format!("no plugin registered for store type '{store_type}'")))
    }
}
