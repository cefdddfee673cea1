//! Entity handles and allocation.
//!
//! An [`Entity`] is an opaque `u64` handle. Each runner owns its own
//! allocator, so handles are only meaningful within one world.

use serde::{Deserialize, Serialize};

/// A handle to an entity inside one world's entity-component state.
///
/// Handles are never reused within a world: removing an entity retires its
/// handle for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null handle. Never returned by an allocator.
    pub const NULL: Entity = Entity(0);

    /// Wrap a raw handle value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw handle value.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `false` for [`Entity::NULL`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out entity handles for a single world, starting at 1.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates the next unused handle.
    pub fn allocate(&mut self) -> Entity {
        let entity = Entity(self.next_id);
        self.next_id += 1;
        entity
    }

    /// Total number of handles handed out, including retired ones.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_entity_is_invalid() {
        assert!(!Entity::NULL.is_valid());
        assert!(Entity::from_raw(7).is_valid());
        assert_eq!(Entity::from_raw(7).id(), 7);
    }

    #[test]
    fn test_allocator_starts_at_one() {
        let mut alloc = EntityAllocator::new();
        assert_eq!(alloc.allocate(), Entity(1));
        assert_eq!(alloc.allocate(), Entity(2));
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity(12).to_string(), "#12");
    }
}
