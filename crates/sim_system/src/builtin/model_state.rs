use serde_json::{Map, Value};
use sim_ecs::{Entity, EntityComponentManager};

use crate::builtin::MODEL_STATE;
use crate::events::EventManager;
use crate::system::{System, UpdateInfo};

/// Applies fixed component values to named entities when attached and again
/// on every reset.
///
/// Config shape: `{"entities": {"<entity name>": {"<component>": <value>}}}`.
#[derive(Debug, Default)]
pub struct ModelState {
    states: Map<String, Value>,
}

impl ModelState {
    fn apply(&self, ecm: &mut EntityComponentManager) {
        for (name, components) in &self.states {
            let Some(entity) = ecm.entity_by_name(name) else {
                tracing::warn!(entity = %name, "model_state target not found");
                continue;
            };
            let Some(components) = components.as_object() else {
                tracing::warn!(entity = %name, "model_state entry is not an object");
                continue;
            };
            for (component, value) in components {
                if let Err(e) = ecm.set_component(entity, component, value.clone()) {
                    tracing::warn!(entity = %name, component = %component, error = %e, "model_state update failed");
                }
            }
        }
    }
}

impl System for ModelState {
    fn name(&self) -> &str {
        MODEL_STATE
    }

    fn configure(
        &mut self,
        _entity: Entity,
        config: &Value,
        ecm: &mut EntityComponentManager,
        _events: &EventManager,
    ) {
        self.states = config
            .get("entities")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        self.apply(ecm);
    }

    fn reset(&mut self, _info: &UpdateInfo, ecm: &mut EntityComponentManager) {
        self.apply(ecm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_applies_on_configure_and_reset() {
        let mut ecm = EntityComponentManager::new();
        let world = ecm.create_entity("w", None).unwrap();
        let lamp = ecm.create_entity("lamp", Some(world)).unwrap();

        let mut system = ModelState::default();
        let config = json!({"entities": {"lamp": {"on": true}, "ghost": {"on": true}}});
        system.configure(world, &config, &mut ecm, &EventManager::new());
        assert_eq!(ecm.component(lamp, "on"), Some(&json!(true)));

        ecm.set_component(lamp, "on", json!(false)).unwrap();
        system.reset(&UpdateInfo::default(), &mut ecm);
        assert_eq!(ecm.component(lamp, "on"), Some(&json!(true)));
    }
}
