//! Typed components.
//!
//! Components live in the [`EntityComponentManager`](crate::EntityComponentManager)
//! as JSON values keyed by name, which is what world descriptions produce.
//! Systems that want typed access implement [`Component`] for a serde type
//! and go through [`EntityComponentManager::get`](crate::EntityComponentManager::get)
//! and [`EntityComponentManager::set`](crate::EntityComponentManager::set).

use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Component name of the marker attached to every world's root entity.
pub const WORLD: &str = "world";

/// Component name holding a world's physics settings on its root entity.
pub const PHYSICS: &str = "physics";

/// A component with a fixed storage name.
pub trait Component: Serialize + DeserializeOwned {
    /// The key the component is stored under.
    const NAME: &'static str;
}

/// Position and orientation of an entity, relative to its parent.
///
/// In a world description this is written as
/// `{"position": [x, y, z], "rotation": [x, y, z, w]}`; `rotation` may be
/// omitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub fn translated(mut self, offset: Vec3) -> Self {
        self.position += offset;
        self
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Pose {
    const NAME: &'static str = "pose";
}

/// Linear velocity in metres per second, written as `[x, y, z]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearVelocity(pub Vec3);

impl Component for LinearVelocity {
    const NAME: &'static str = "linear_velocity";
}
