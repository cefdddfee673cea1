//! The `System` trait and per-step context.

use std::time::Duration;

use sim_ecs::{Entity, EntityComponentManager};
use serde_json::Value;

use crate::events::EventManager;

/// Step metadata handed to every system callback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateInfo {
    /// Unpaused steps completed before this one.
    pub iterations: u64,
    /// Simulated time at the start of this step.
    pub sim_time: Duration,
    /// Wall-clock time spent stepping so far.
    pub real_time: Duration,
    /// Simulated time this step advances by. Zero while paused.
    pub dt: Duration,
    pub paused: bool,
}

impl UpdateInfo {
    /// `dt` in seconds.
    #[must_use]
    pub fn dt_secs(&self) -> f32 {
        self.dt.as_secs_f32()
    }
}

/// A behavior attached to a world.
///
/// Every callback has an empty default, so a system only implements the
/// phases it cares about. Callbacks run on the simulation thread with the
/// runner's state locked; they must not block.
pub trait System: Send {
    /// Registered name, used in logs.
    fn name(&self) -> &str;

    /// Called once when the system is attached to `entity`.
    fn configure(
        &mut self,
        _entity: Entity,
        _config: &Value,
        _ecm: &mut EntityComponentManager,
        _events: &EventManager,
    ) {
    }

    fn pre_update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {}

    fn update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {}

    /// Read-only view of the state after this step's updates.
    fn post_update(&mut self, _info: &UpdateInfo, _ecm: &EntityComponentManager) {}

    /// Return to the state right after `configure`.
    fn reset(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        updates: u32,
    }

    impl System for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {
            self.updates += 1;
        }
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        let mut ecm = EntityComponentManager::new();
        let world = ecm.create_entity("w", None).unwrap();
        let mut system: Box<dyn System> = Box::new(Counter { updates: 0 });
        let info = UpdateInfo {
            dt: Duration::from_millis(1),
            ..UpdateInfo::default()
        };

        system.configure(world, &Value::Null, &mut ecm, &EventManager::new());
        system.pre_update(&info, &mut ecm);
        system.update(&info, &mut ecm);
        system.post_update(&info, &ecm);
        system.reset(&info, &mut ecm);

        assert_eq!(system.name(), "counter");
        assert_eq!(ecm.entity_count(), 1);
        assert!((info.dt_secs() - 0.001).abs() < f32::EPSILON);
    }
}
