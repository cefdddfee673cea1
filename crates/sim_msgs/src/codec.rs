//! MessagePack codec helpers.
//!
//! Every payload on the bus is MessagePack, so subscribers in other
//! processes could decode the same bytes.

use serde::{Deserialize, Serialize};

use crate::error::MsgError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`MsgError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MsgError> {
    rmp_serde::to_vec_named(value).map_err(MsgError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`MsgError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, MsgError> {
    rmp_serde::from_slice(bytes).map_err(MsgError::Decode)
}
