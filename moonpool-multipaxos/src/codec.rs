//! Pluggable wire serialization for protocol messages.
//!
//! The replica never touches bytes: transports are external. A transport
//! that needs a wire format picks a [`MessageCodec`]; [`JsonCodec`] is the
//! default, human-readable choice.
//!
//! ```rust
//! use moonpool_multipaxos::{Ballot, JsonCodec, Message, MessageCodec, ReplicaId, Slot};
//! use moonpool_multipaxos::messages::Prepare;
//!
//! let msg = Message::Prepare(Prepare {
//!     ballot: Ballot::new(1, ReplicaId(1)),
//!     from: Slot::FIRST,
//! });
//! let bytes = JsonCodec.encode(&msg).expect("encode");
//! let decoded: Message = JsonCodec.decode(&bytes).expect("decode");
//! assert_eq!(msg, decoded);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::PaxosError;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    #[error("encode error: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a message.
    #[error("decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

impl From<CodecError> for PaxosError {
    fn from(err: CodecError) -> Self {
        PaxosError::Codec(err.to_string())
    }
}

/// Pluggable message serialization format.
///
/// `Clone + 'static` so codec instances can live inside transports.
pub trait MessageCodec: Clone + 'static {
    /// Encode a serializable message to bytes.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable message.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
