//! # sim_msgs
//!
//! Messages exchanged between a simulation server and its observers.
//!
//! This crate provides:
//!
//! - [`topics`] — topic name constants and builders.
//! - [`messages`] — statistics and control message types.
//! - [`codec`] — MessagePack serialisation/deserialisation helpers.
//! - [`bus`] — an in-process publish/subscribe bus carrying encoded payloads.
//! - [`error`] — message-layer error types.

pub mod bus;
pub mod codec;
pub mod error;
pub mod messages;
pub mod topics;

pub use bus::{MessageBus, Subscription};
pub use codec::{decode, encode};
pub use error::MsgError;
pub use messages::{ServerControl, StringList, WorldStatistics};
