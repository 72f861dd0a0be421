//! Pub/Sub push delivery messages.
//!
//! Field numbers follow `google.pubsub.v1` (`PubsubMessage`,
//! `ReceivedMessage`) and the push acknowledgment service (`Ack`).

use std::collections::HashMap;

use bytes::Bytes;

/// A message published to a topic.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PubsubMessage {
    /// Opaque payload.
    #[prost(bytes = "bytes", tag = "1")]
    pub data: Bytes,

    /// Publisher supplied attributes.
    #[prost(map = "string, string", tag = "2")]
    pub attributes: HashMap<String, String>,

    /// Server assigned identifier.
    #[prost(string, tag = "3")]
    pub message_id: String,

    #[prost(message, optional, tag = "4")]
    pub publish_time: Option<Timestamp>,

    #[prost(string, tag = "5")]
    pub ordering_key: String,
}

/// A message as delivered to a push subscriber.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReceivedMessage {
    /// Identifier used to acknowledge this delivery.
    #[prost(string, tag = "1")]
    pub ack_id: String,

    #[prost(message, optional, tag = "2")]
    pub message: Option<PubsubMessage>,

    /// Approximate number of delivery attempts so far.
    #[prost(int32, tag = "3")]
    pub delivery_attempt: i32,
}

/// Acknowledgment written back once the event was accepted upstream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ack {
    #[prost(string, tag = "1")]
    pub ack_id: String,
}

/// `google.protobuf.Timestamp`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,

    #[prost(int32, tag = "2")]
    pub nanos: i32,
}
