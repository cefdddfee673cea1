//! Message-layer error types.

/// Errors that can occur while encoding, decoding or receiving messages.
#[derive(Debug, thiserror::Error)]
pub enum MsgError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Every sender of the bus has been dropped.
    #[error("message bus closed")]
    Closed,
}
