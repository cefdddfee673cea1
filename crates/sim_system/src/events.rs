//! Event sink shared between a runner and its systems.
//!
//! Systems emit events from any callback; the runner drains and applies them
//! after the step finishes, once its state lock is released.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

/// A request from a system to its runner.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Pause (`true`) or resume (`false`) the world.
    Pause(bool),
    /// Stop the runner's loop after the current step.
    Stop,
    /// Reset the world at the next step boundary.
    Reset,
    /// Application-defined event, logged by the runner.
    Custom { name: String, data: Value },
}

/// Cloneable handle to a runner's event queue.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    queue: Arc<Mutex<VecDeque<SimEvent>>>,
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SimEvent) {
        self.lock().push_back(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<SimEvent> {
        self.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SimEvent>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
