//! The world description data model.
//!
//! These types mirror the JSON layout one-to-one:
//!
//! ```json
//! {
//!   "worlds": [{
//!     "name": "shapes",
//!     "physics": { "max_step_size": 0.001, "real_time_factor": 1.0 },
//!     "entities": [{ "name": "box", "components": { "pose": { "position": [0, 0, 1] } } }],
//!     "includes": [{ "uri": "models/rover", "name": "rover_1" }],
//!     "plugins": [{ "name": "velocity_integrator" }]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name given to the world synthesized when no source is configured.
pub const DEFAULT_WORLD_NAME: &str = "default";

/// A parsed description: zero or more worlds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldDescription {
    #[serde(default)]
    pub worlds: Vec<WorldSpec>,
}

impl WorldDescription {
    /// A description holding one empty world called `name`.
    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            worlds: vec![WorldSpec::new(name)],
        }
    }

    /// The description used when the server is configured with no source.
    #[must_use]
    pub fn default_world() -> Self {
        Self::single(DEFAULT_WORLD_NAME)
    }

    #[must_use]
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    #[must_use]
    pub fn world(&self, index: usize) -> Option<&WorldSpec> {
        self.worlds.get(index)
    }

    pub fn world_names(&self) -> impl Iterator<Item = &str> {
        self.worlds.iter().map(|w| w.name.as_str())
    }
}

/// One world.
///
/// After loading, `entities` already contains the expanded includes;
/// `includes` is kept for provenance only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub physics: PhysicsDescription,
    #[serde(default)]
    pub entities: Vec<EntityDescription>,
    #[serde(default)]
    pub includes: Vec<IncludeDescription>,
    #[serde(default)]
    pub plugins: Vec<PluginDescription>,
}

impl WorldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityDescription) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }

    #[must_use]
    pub fn with_physics(mut self, physics: PhysicsDescription) -> Self {
        self.physics = physics;
        self
    }

    /// Entities in the whole tree, counting nested children.
    #[must_use]
    pub fn entity_tree_size(&self) -> usize {
        self.entities.iter().map(EntityDescription::tree_size).sum()
    }
}

/// Step size and pacing for a world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsDescription {
    /// Simulated seconds advanced per step.
    #[serde(default = "default_step_size")]
    pub max_step_size: f64,
    /// Simulated time over wall time. Zero runs unthrottled.
    #[serde(default = "default_real_time_factor")]
    pub real_time_factor: f64,
}

fn default_step_size() -> f64 {
    0.001
}

fn default_real_time_factor() -> f64 {
    1.0
}

impl Default for PhysicsDescription {
    fn default() -> Self {
        Self {
            max_step_size: default_step_size(),
            real_time_factor: default_real_time_factor(),
        }
    }
}

/// An entity with its components, children and attached systems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<EntityDescription>,
    #[serde(default)]
    pub plugins: Vec<PluginDescription>,
}

impl EntityDescription {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_component(mut self, name: impl Into<String>, value: Value) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: EntityDescription) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// This entity plus all descendants.
    #[must_use]
    pub fn tree_size(&self) -> usize {
        1 + self.children.iter().map(Self::tree_size).sum::<usize>()
    }
}

/// A reference to an entity tree stored in another file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeDescription {
    pub uri: String,
    /// Replaces the included entity's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Merged over the included entity's components.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub components: Map<String, Value>,
}

/// A system to attach, by registered name, with its configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

impl PluginDescription {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Value::Null,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}
