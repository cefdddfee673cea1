//! In-process message bus.
//!
//! A single `tokio::sync::broadcast` channel carries every topic. Payloads
//! are encoded once on publish and shared between subscribers; each
//! [`Subscription`] filters for its own topic. The bus works from plain
//! threads as well as async tasks.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

use crate::codec::{decode, encode};
use crate::error::MsgError;

/// Messages buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Envelope {
    topic: Arc<str>,
    payload: Arc<[u8]>,
}

/// Cloneable handle to a publish/subscribe channel.
#[derive(Debug, Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<Envelope>,
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `message` on `topic`.
    ///
    /// Returns the number of live subscriptions it was delivered to (zero is
    /// not an error).
    ///
    /// # Errors
    ///
    /// Returns [`MsgError::Encode`] if the message cannot be serialised.
    pub fn publish<T: Serialize>(&self, topic: &str, message: &T) -> Result<usize, MsgError> {
        let payload = encode(message)?;
        let envelope = Envelope {
            topic: Arc::from(topic),
            payload: Arc::from(payload),
        };
        Ok(self.sender.send(envelope).unwrap_or(0))
    }

    /// Subscribe to `topic`. Only messages published after this call are seen.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions across all topics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's view of one topic.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    topic: String,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message on this topic if one is already queued.
    ///
    /// # Errors
    ///
    /// Returns [`MsgError::Decode`] for a payload of the wrong type and
    /// [`MsgError::Closed`] once the bus is gone and drained.
    pub fn try_recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>, MsgError> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) if *envelope.topic == *self.topic => {
                    return decode(&envelope.payload).map(Some);
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "subscriber lagged, messages dropped");
                }
                Err(TryRecvError::Closed) => return Err(MsgError::Closed),
            }
        }
    }

    /// Block the current thread until a message arrives on this topic.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`try_recv`](Self::try_recv).
    pub fn recv_blocking<T: DeserializeOwned>(&mut self) -> Result<T, MsgError> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(envelope) if *envelope.topic == *self.topic => {
                    return decode(&envelope.payload);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => return Err(MsgError::Closed),
            }
        }
    }

    /// Everything currently queued on this topic, oldest first.
    ///
    /// # Errors
    ///
    /// Same as [`try_recv`](Self::try_recv).
    pub fn drain<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, MsgError> {
        let mut out = Vec::new();
        while let Some(msg) = self.try_recv()? {
            out.push(msg);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{StringList, WorldStatistics};
    use crate::topics;

    fn stats(world: &str, iterations: u64) -> WorldStatistics {
        WorldStatistics {
            world: world.to_string(),
            iterations,
            sim_time: iterations as f64 * 0.001,
            real_time: 0.0,
            paused: false,
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = MessageBus::new();
        assert_eq!(bus.publish(topics::WORLDS, &StringList::new(["a"])).unwrap(), 0);
    }

    #[test]
    fn test_subscription_filters_by_topic() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(&topics::world_stats("a"));
        bus.publish(&topics::world_stats("b"), &stats("b", 1)).unwrap();
        bus.publish(&topics::world_stats("a"), &stats("a", 2)).unwrap();

        let msg: WorldStatistics = sub.try_recv().unwrap().unwrap();
        assert_eq!(msg.world, "a");
        assert_eq!(msg.iterations, 2);
        assert!(sub.try_recv::<WorldStatistics>().unwrap().is_none());
    }

    #[test]
    fn test_lagged_subscriber_keeps_newest() {
        let bus = MessageBus::with_capacity(2);
        let mut sub = bus.subscribe("t");
        for i in 0..5 {
            bus.publish("t", &stats("w", i)).unwrap();
        }
        let got: Vec<WorldStatistics> = sub.drain().unwrap();
        assert_eq!(got.iter().map(|s| s.iterations).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_recv_blocking_across_threads() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(topics::RESOURCE_PATHS);
        let publisher = bus.clone();
        let handle = std::thread::spawn(move || {
            publisher
                .publish(topics::RESOURCE_PATHS, &StringList::new(["/tmp/models"]))
                .unwrap();
        });
        let list: StringList = sub.recv_blocking().unwrap();
        handle.join().unwrap();
        assert_eq!(list.data, vec!["/tmp/models".to_string()]);
    }

    #[test]
    fn test_closed_bus() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe("t");
        drop(bus);
        assert!(matches!(sub.try_recv::<StringList>(), Err(MsgError::Closed)));
    }
}
