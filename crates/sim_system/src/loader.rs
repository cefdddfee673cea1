//! Resolves plugin declarations into system instances.

use std::sync::Arc;

use serde_json::Value;
use sim_world::PluginDescription;
use thiserror::Error;

use crate::registry::{SystemRegistry, SystemSource};
use crate::system::System;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemLoadError {
    #[error("plugin declaration has no name")]
    EmptyName,
    #[error("no system named '{name}' (searched {searched} sources)")]
    NotFound { name: String, searched: usize },
}

/// A system ready to be attached, with the configuration it was declared with.
pub struct LoadedSystem {
    pub name: String,
    pub system: Box<dyn System>,
    pub config: Value,
}

impl std::fmt::Debug for LoadedSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSystem")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Looks systems up in an ordered list of sources; the first match wins.
#[derive(Clone)]
pub struct SystemLoader {
    sources: Vec<Arc<dyn SystemSource>>,
}

impl SystemLoader {
    /// A loader with no sources. Every load fails.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a source, searched after the existing ones.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SystemSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Instantiate the system a plugin declaration names.
    ///
    /// # Errors
    ///
    /// [`SystemLoadError::EmptyName`] for a blank name,
    /// [`SystemLoadError::NotFound`] if no source knows the name.
    pub fn load(&self, plugin: &PluginDescription) -> Result<LoadedSystem, SystemLoadError> {
        let name = plugin.name.trim();
        if name.is_empty() {
            return Err(SystemLoadError::EmptyName);
        }
        let system = self
            .sources
            .iter()
            .find_map(|source| source.instantiate(name))
            .ok_or_else(|| SystemLoadError::NotFound {
                name: name.to_string(),
                searched: self.sources.len(),
            })?;
        tracing::debug!(system = name, "loaded system");
        Ok(LoadedSystem {
            name: name.to_string(),
            system,
            config: plugin.config.clone(),
        })
    }
}

impl Default for SystemLoader {
    /// A loader backed by the built-in registry.
    fn default() -> Self {
        Self::empty().with_source(Arc::new(SystemRegistry::with_builtins()))
    }
}
