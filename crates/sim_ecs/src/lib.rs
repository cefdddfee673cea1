//! # sim_ecs
//!
//! The entity-component state a simulation runner steps its systems against.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u64` entity handles.
//! - [`EntityAllocator`] — monotonically increasing handle allocator.
//! - [`EntityComponentManager`] — entity hierarchy, name lookups, component
//!   storage and the deferred-removal queue.
//! - [`components`] — typed components shared by systems (`Pose`,
//!   `LinearVelocity`, ...).

pub mod components;
pub mod entity;
pub mod manager;

pub use components::{Component, LinearVelocity, Pose};
pub use entity::{Entity, EntityAllocator};
pub use manager::{EcsError, EntityComponentManager};
