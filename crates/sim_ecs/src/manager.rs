/// Entity-component manager: one world's entity hierarchy and component data.
///
/// Components are stored as `serde_json::Value` keyed by component name, the
/// same shape world descriptions carry. Typed access goes through
/// [`Component`]. Entity removal is deferred: systems request it during a
/// step and the runner applies the queue once all systems have run.
use crate::components::Component;
use crate::entity::{Entity, EntityAllocator};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EcsError {
    #[error("entity {0} not found")]
    EntityNotFound(Entity),
    #[error("parent entity {0} not found")]
    ParentNotFound(Entity),
    #[error("invalid value for component '{component}': {message}")]
    InvalidComponent { component: String, message: String },
}

#[derive(Debug, Clone, Default)]
struct EntityRecord {
    name: String,
    parent: Option<Entity>,
    children: BTreeSet<Entity>,
    components: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy)]
struct RemovalRequest {
    entity: Entity,
    recursive: bool,
}

/// Per-world entity and component storage.
#[derive(Debug, Default)]
pub struct EntityComponentManager {
    allocator: EntityAllocator,
    entities: BTreeMap<Entity, EntityRecord>,
    removals: Vec<RemovalRequest>,
}

impl EntityComponentManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Entity lifecycle --

    /// Create a named entity with no parent.
    pub fn create_root(&mut self, name: impl Into<String>) -> Entity {
        let entity = self.allocator.allocate();
        self.entities.insert(
            entity,
            EntityRecord {
                name: name.into(),
                ..EntityRecord::default()
            },
        );
        entity
    }

    /// Create a named entity, optionally attached to `parent`.
    pub fn create_entity(
        &mut self,
        name: impl Into<String>,
        parent: Option<Entity>,
    ) -> Result<Entity, EcsError> {
        let Some(p) = parent else {
            return Ok(self.create_root(name));
        };
        if !self.entities.contains_key(&p) {
            return Err(EcsError::ParentNotFound(p));
        }
        let entity = self.create_root(name);
        if let Some(record) = self.entities.get_mut(&entity) {
            record.parent = Some(p);
        }
        if let Some(record) = self.entities.get_mut(&p) {
            record.children.insert(entity);
        }
        Ok(entity)
    }

    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All live entities in creation order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.keys().copied().collect()
    }

    #[must_use]
    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.entities.get(&entity).map(|r| r.name.as_str())
    }

    #[must_use]
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.entities.get(&entity).and_then(|r| r.parent)
    }

    #[must_use]
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.entities
            .get(&entity)
            .map(|r| r.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The oldest live entity called `name`, anywhere in the hierarchy.
    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.entities
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(e, _)| *e)
    }

    /// The direct child of `parent` called `name`.
    #[must_use]
    pub fn child_by_name(&self, parent: Entity, name: &str) -> Option<Entity> {
        let record = self.entities.get(&parent)?;
        record
            .children
            .iter()
            .copied()
            .find(|c| self.name(*c) == Some(name))
    }

    /// Every entity below `root`, depth first, not including `root`.
    #[must_use]
    pub fn descendants(&self, root: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut stack = self.children(root);
        stack.reverse();
        while let Some(e) = stack.pop() {
            out.push(e);
            let mut kids = self.children(e);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    // -- Removal --

    /// Queue `entity` for removal at the end of the current step.
    ///
    /// A recursive removal takes the whole subtree. A non-recursive removal
    /// leaves the children in place, detached from any parent. Returns
    /// `false` if the entity does not exist.
    pub fn request_remove(&mut self, entity: Entity, recursive: bool) -> bool {
        if !self.entities.contains_key(&entity) {
            return false;
        }
        self.removals.push(RemovalRequest { entity, recursive });
        true
    }

    /// Number of removal requests waiting for [`process_removals`](Self::process_removals).
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    /// Apply all queued removals. Returns the entities actually removed.
    pub fn process_removals(&mut self) -> Vec<Entity> {
        let requests = std::mem::take(&mut self.removals);
        let mut removed = Vec::new();
        for req in requests {
            if !self.entities.contains_key(&req.entity) {
                continue;
            }
            let mut doomed = vec![req.entity];
            if req.recursive {
                doomed.extend(self.descendants(req.entity));
            }
            for e in doomed {
                if let Some(record) = self.entities.remove(&e) {
                    if let Some(p) = record.parent.and_then(|p| self.entities.get_mut(&p)) {
                        p.children.remove(&e);
                    }
                    for child in record.children {
                        if let Some(c) = self.entities.get_mut(&child) {
                            c.parent = None;
                        }
                    }
                    removed.push(e);
                }
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "removed entities");
        }
        removed
    }

    // -- Component operations --

    /// Set a component value, replacing any previous value.
    pub fn set_component(
        &mut self,
        entity: Entity,
        component: &str,
        value: Value,
    ) -> Result<(), EcsError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        record.components.insert(component.to_string(), value);
        Ok(())
    }

    #[must_use]
    pub fn component(&self, entity: Entity, component: &str) -> Option<&Value> {
        self.entities.get(&entity)?.components.get(component)
    }

    #[must_use]
    pub fn has_component(&self, entity: Entity, component: &str) -> bool {
        self.component(entity, component).is_some()
    }

    /// Remove a component. Returns the old value if there was one.
    pub fn remove_component(&mut self, entity: Entity, component: &str) -> Option<Value> {
        self.entities.get_mut(&entity)?.components.remove(component)
    }

    /// Component names present on `entity`.
    #[must_use]
    pub fn component_names(&self, entity: Entity) -> Vec<String> {
        self.entities
            .get(&entity)
            .map(|r| r.components.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entities carrying every listed component.
    #[must_use]
    pub fn entities_with(&self, components: &[&str]) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, r)| components.iter().all(|c| r.components.contains_key(*c)))
            .map(|(e, _)| *e)
            .collect()
    }

    /// Typed read of a component.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Option<T>, EcsError> {
        match self.component(entity, T::NAME) {
            None => Ok(None),
            Some(v) => T::deserialize(v)
                .map(Some)
                .map_err(|e| EcsError::InvalidComponent {
                    component: T::NAME.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Typed write of a component.
    pub fn set<T: Component>(&mut self, entity: Entity, value: &T) -> Result<(), EcsError> {
        let json = serde_json::to_value(value).map_err(|e| EcsError::InvalidComponent {
            component: T::NAME.to_string(),
            message: e.to_string(),
        })?;
        self.set_component(entity, T::NAME, json)
    }
}
