//! Pub/Sub protocol binding (unbind direction).
//!
//! # Content Modes
//! - Binary: every attribute prefixed `ce-` is an event attribute and
//!   the message data is the event payload
//! - Structured: attribute `content-type` starts with
//!   `application/cloudevents` and the message data is a JSON event

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value;

use crate::binding::{BindingError, CloudEvent, EventBuilder};
use crate::codec::PubsubMessage;

const ATTRIBUTE_PREFIX: &str = "ce-";
const CONTENT_TYPE_ATTRIBUTE: &str = "content-type";
const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents";

/// Convert a Pub/Sub message into a CloudEvent.
pub fn unbind(message: &PubsubMessage) -> Result<CloudEvent, BindingError> {
    if is_structured(message) {
        unbind_structured(message)
    } else {
        unbind_binary(message)
    }
}

fn is_structured(message: &PubsubMessage) -> bool {
    message
        .attributes
        .iter()
        .any(|(name, value)| {
            name.eq_ignore_ascii_case(CONTENT_TYPE_ATTRIBUTE)
                && value
                    .to_ascii_lowercase()
                    .starts_with(STRUCTURED_CONTENT_TYPE)
        })
}

fn unbind_binary(message: &PubsubMessage) -> Result<CloudEvent, BindingError> {
    let mut builder = EventBuilder::default();
    let mut seen = HashSet::new();
    for (name, value) in &message.attributes {
        let name = name.to_ascii_lowercase();
        let Some(attribute) = name.strip_prefix(ATTRIBUTE_PREFIX) else {
            continue;
        };
        // Attribute names are case-insensitive.
        if !seen.insert(attribute.to_string()) {
            return Err(BindingError::DuplicateAttribute(attribute.to_string()));
        }
        builder.attribute(attribute, value.clone())?;
    }
    builder.data(message.data.clone());
    builder.build()
}

fn unbind_structured(message: &PubsubMessage) -> Result<CloudEvent, BindingError> {
    let object: serde_json::Map<String, Value> = serde_json::from_slice(&message.data)?;

    let mut builder = EventBuilder::default();
    let mut json_data = false;
    for (name, value) in object {
        match name.as_str() {
            "data" => {
                let data = match value {
                    Value::String(text) => Bytes::from(text),
                    Value::Null => continue,
                    other => {
                        json_data = true;
                        Bytes::from(other.to_string())
                    }
                };
                builder.data(data);
            }
            "data_base64" => {
                let Value::String(encoded) = value else {
                    return Err(BindingError::InvalidAttributeValue(name));
                };
                builder.data(Bytes::from(STANDARD.decode(encoded)?));
            }
            _ => {
                let text = match value {
                    Value::String(text) => text,
                    Value::Null => continue,
                    Value::Bool(flag) => flag.to_string(),
                    Value::Number(number) => number.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(BindingError::InvalidAttributeValue(name));
                    }
                };
                builder.attribute(&name, text)?;
            }
        }
    }

    if json_data && !builder.has_data_content_type() {
        builder.attribute("datacontenttype", "application/json".to_string())?;
    }
    builder.build()
}
