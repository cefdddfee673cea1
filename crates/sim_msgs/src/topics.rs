//! Topic names.
//!
//! All server topics are prefixed with `sim.`.

/// Root prefix for all simulation topics.
pub const PREFIX: &str = "sim";

/// Names of the worlds a server is running. Server → *.
pub const WORLDS: &str = "sim.worlds";

/// Current resource search paths, republished whenever paths are added.
pub const RESOURCE_PATHS: &str = "sim.resource_paths";

/// Server-control requests. * → Server.
pub const SERVER_CONTROL: &str = "sim.server_control";

/// Per-step statistics of one world.
///
/// `sim.world.<world>.stats`
#[must_use]
pub fn world_stats(world: &str) -> String {
    format!("sim.world.{world}.stats")
}
