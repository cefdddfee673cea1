//! Message types published and consumed by the simulation server.
//!
//! All message types derive `Serialize` and `Deserialize` and travel as
//! MessagePack payloads on the [`MessageBus`](crate::MessageBus).

use serde::{Deserialize, Serialize};

/// Published by a runner after every step on
/// [`topics::world_stats`](crate::topics::world_stats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStatistics {
    pub world: String,
    /// Unpaused steps taken since the runner was created.
    pub iterations: u64,
    /// Simulated seconds since the last reset.
    pub sim_time: f64,
    /// Wall-clock seconds spent stepping.
    pub real_time: f64,
    pub paused: bool,
}

/// A request to the server, received on
/// [`topics::SERVER_CONTROL`](crate::topics::SERVER_CONTROL).
///
/// Only `stop` is acted upon; the remaining requests are answered as
/// unsupported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerControl {
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub clone: bool,
    #[serde(default)]
    pub new_world: bool,
    #[serde(default)]
    pub open_filename: String,
    #[serde(default)]
    pub save_world_name: String,
}

impl ServerControl {
    /// A request to stop the server.
    #[must_use]
    pub fn stop() -> Self {
        Self {
            stop: true,
            ..Self::default()
        }
    }
}

/// A list of strings, used for world names and resource paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringList {
    pub data: Vec<String>,
}

impl StringList {
    #[must_use]
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: items.into_iter().map(Into::into).collect(),
        }
    }
}
