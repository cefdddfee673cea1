//! # sim_system
//!
//! The lifecycle contract between a simulation runner and the systems
//! ("plugins") attached to its world.
//!
//! A runner drives every attached [`System`] through:
//!
//! 1. `configure` — once, when attached, with the entity it is attached to
//!    and its JSON configuration.
//! 2. `pre_update` / `update` / `post_update` — once per unpaused step, in
//!    attachment order.
//! 3. `reset` — on demand.
//!
//! Systems are created by name through a [`SystemLoader`], which consults one
//! or more [`SystemSource`]s. The default source is a [`SystemRegistry`]
//! pre-populated with the [`builtin`] systems.

pub mod builtin;
pub mod events;
pub mod loader;
pub mod registry;
pub mod system;

pub use events::{EventManager, SimEvent};
pub use loader::{LoadedSystem, SystemLoadError, SystemLoader};
pub use registry::{SystemFactory, SystemRegistry, SystemSource};
pub use system::{System, UpdateInfo};
