//! Envelope wire codec.
//!
//! # Data Flow
//! ```text
//! push request body (protobuf bytes)
//!     → decode_envelope → ReceivedMessage { ack_id, message }
//!
//! upstream accepted the event
//!     → encode_ack(ack_id) → Ack (protobuf bytes) → response body
//! ```
//!
//! # Design Decisions
//! - Message definitions are maintained by hand with `prost` derives;
//!   the schema is small and stable, so no build-time codegen
//! - A missing embedded message decodes as an empty one; the binding
//!   layer rejects it for lacking attributes

pub mod pubsub;

use bytes::Bytes;
use prost::Message;

pub use pubsub::{Ack, PubsubMessage, ReceivedMessage, Timestamp};

/// Decode a complete request body as a push envelope.
pub fn decode_envelope(body: &[u8]) -> Result<ReceivedMessage, prost::DecodeError> {
    ReceivedMessage::decode(body)
}

/// Serialize the acknowledgment record for a delivery.
pub fn encode_ack(ack_id: &str) -> Bytes {
    let ack = Ack {
        ack_id: ack_id.to_string(),
    };
    Bytes::from(ack.encode_to_vec())
}
