//! HTTP protocol binding (bind direction), binary content mode.

use crate::binding::{BindingError, CloudEvent, HttpMessage};

const CONTENT_TYPE: &str = "content-type";

/// Convert a CloudEvent into HTTP header pairs and a body.
///
/// Context attributes become `ce-` headers, `datacontenttype` becomes
/// `content-type` and the event data becomes the body.
pub fn bind(event: &CloudEvent) -> Result<HttpMessage, BindingError> {
    let mut headers = Vec::with_capacity(5 + event.extensions.len());

    push(&mut headers, "ce-specversion".to_string(), &event.spec_version)?;
    push(&mut headers, "ce-id".to_string(), &event.id)?;
    push(&mut headers, "ce-source".to_string(), &event.source)?;
    push(&mut headers, "ce-type".to_string(), &event.ty)?;

    let optional = [
        ("ce-subject", &event.subject),
        ("ce-time", &event.time),
        ("ce-dataschema", &event.data_schema),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            push(&mut headers, name.to_string(), value)?;
        }
    }

    for (name, value) in &event.extensions {
        push(&mut headers, format!("ce-{name}"), value)?;
    }

    if let Some(content_type) = &event.data_content_type {
        push(&mut headers, CONTENT_TYPE.to_string(), content_type)?;
    }

    Ok(HttpMessage {
        headers,
        body: event.data.clone(),
    })
}

fn push(
    headers: &mut Vec<(String, String)>,
    name: String,
    value: &str,
) -> Result<(), BindingError> {
    if !is_visible_ascii(value) {
        return Err(BindingError::InvalidHeaderValue(name));
    }
    headers.push((name, value.to_string()));
    Ok(())
}

fn is_visible_ascii(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}
