//! CloudEvents protocol bindings.
//!
//! # Data Flow
//! ```text
//! PubsubMessage (attributes + data)
//!     → pubsub.rs (unbind: binary or structured content mode)
//!     → CloudEvent (normalized attributes + payload)
//!     → http.rs (bind: binary content mode)
//!     → HttpMessage (header pairs + body)
//! ```
//!
//! # Design Decisions
//! - Both directions are pure functions; the filter owns all side effects
//! - Only CloudEvents 1.0 is accepted
//! - `Binder` is the seam the filter depends on, so hosts can plug in
//!   another binding without touching the state machine

pub mod http;
pub mod pubsub;

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::codec::PubsubMessage;

/// The only CloudEvents specification version understood by the bindings.
pub const SPEC_VERSION: &str = "1.0";

/// Errors raised while converting between bindings.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("required attribute `{0}` is missing")]
    MissingAttribute(&'static str),

    #[error("unsupported specversion `{0}`")]
    UnsupportedSpecVersion(String),

    #[error("invalid attribute name `{0}`")]
    InvalidAttributeName(String),

    #[error("attribute `{0}` is present more than once")]
    DuplicateAttribute(String),

    #[error("attribute `{0}` must be a string, number or boolean")]
    InvalidAttributeValue(String),

    #[error("structured event is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data_base64 is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("value of header `{0}` is not representable in HTTP")]
    InvalidHeaderValue(String),
}

/// A normalized CloudEvent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloudEvent {
    pub spec_version: String,
    pub id: String,
    pub source: String,
    pub ty: String,
    pub data_content_type: Option<String>,
    pub data_schema: Option<String>,
    pub subject: Option<String>,
    pub time: Option<String>,
    /// Extension attributes, keyed by lowercase name.
    pub extensions: BTreeMap<String, String>,
    pub data: Bytes,
}

/// HTTP shaped result of binding an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpMessage {
    /// Header pairs in emission order; names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Conversion collaborator used by the request filter.
pub trait Binder: Send + Sync + 'static {
    /// Turn an embedded Pub/Sub message into a normalized event.
    fn unbind(&self, message: &PubsubMessage) -> Result<CloudEvent, BindingError>;

    /// Turn a normalized event into HTTP headers and body.
    fn bind_http(&self, event: &CloudEvent) -> Result<HttpMessage, BindingError>;
}

/// Pub/Sub to HTTP binding following the CloudEvents 1.0 protocol bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudEventsBinder;

impl Binder for CloudEventsBinder {
    fn unbind(&self, message: &PubsubMessage) -> Result<CloudEvent, BindingError> {
        pubsub::unbind(message)
    }

    fn bind_http(&self, event: &CloudEvent) -> Result<HttpMessage, BindingError> {
        http::bind(event)
    }
}

/// Accumulates attributes until the required ones are known.
#[derive(Debug, Default)]
pub(crate) struct EventBuilder {
    event: CloudEvent,
}

impl EventBuilder {
    /// Set an attribute by its CloudEvents name. Unknown names become extensions.
    pub(crate) fn attribute(&mut self, name: &str, value: String) -> Result<(), BindingError> {
        match name {
            "specversion" => self.event.spec_version = value,
            "id" => self.event.id = value,
            "source" => self.event.source = value,
            "type" => self.event.ty = value,
            "datacontenttype" => self.event.data_content_type = Some(value),
            "dataschema" => self.event.data_schema = Some(value),
            "subject" => self.event.subject = Some(value),
            "time" => self.event.time = Some(value),
            other => {
                if !is_valid_attribute_name(other) {
                    return Err(BindingError::InvalidAttributeName(other.to_string()));
                }
                self.event.extensions.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    pub(crate) fn data(&mut self, data: Bytes) {
        self.event.data = data;
    }

    pub(crate) fn has_data_content_type(&self) -> bool {
        self.event.data_content_type.is_some()
    }

    pub(crate) fn build(self) -> Result<CloudEvent, BindingError> {
        let event = self.event;
        if event.spec_version.is_empty() {
            return Err(BindingError::MissingAttribute("specversion"));
        }
        if event.spec_version != SPEC_VERSION {
            return Err(BindingError::UnsupportedSpecVersion(event.spec_version));
        }
        if event.id.is_empty() {
            return Err(BindingError::MissingAttribute("id"));
        }
        if event.source.is_empty() {
            return Err(BindingError::MissingAttribute("source"));
        }
        if event.ty.is_empty() {
            return Err(BindingError::MissingAttribute("type"));
        }
        Ok(event)
    }
}

/// CloudEvents attribute names are lowercase ASCII letters and digits.
fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
