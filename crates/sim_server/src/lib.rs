//! # sim_server
//!
//! The control plane of a multi-world simulation server.
//!
//! A [`Server`] resolves its configured world source into a
//! [`WorldDescription`](sim_world::WorldDescription), builds one [`Runner`]
//! per world and drives them on a single simulation thread, either on the
//! caller's thread (blocking) or on a dedicated control thread.
//!
//! ## Startup sequence
//!
//! 1. Build a [`ResourceContext`] from the config (cache, search paths).
//! 2. Resolve the world source, or, for file sources with parallel download
//!    enabled, start resolving in the background and bootstrap from the
//!    world names alone.
//! 3. Construct the runners and attach their systems.
//! 4. Arm the signal handler.
//!
//! ## Modules
//!
//! - [`config`] — [`ServerConfig`] and [`WorldSource`].
//! - [`resources`] — resource cache and search paths.
//! - [`resolver`] — world source → description.
//! - [`download`] — background resolution and runner handoff.
//! - [`runner`] — one world's step loop.
//! - [`server`] — the [`Server`] itself.
//! - [`signals`] — SIGINT/SIGTERM handling.

pub mod config;
pub mod download;
pub mod resolver;
pub mod resources;
pub mod runner;
pub mod server;
pub mod signals;

pub use config::{ServerConfig, WorldSource};
pub use download::DownloadOutcome;
pub use resolver::{ResolveError, resolve};
pub use resources::{LocalResourceCache, ResourceCache, ResourceContext};
pub use runner::{Runner, RunnerState};
pub use server::{Server, ServerPhase};
