//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses parse and the marker is a usable header value
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{uri::Authority, HeaderValue};
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("filter.content_type must not be empty")]
    EmptyContentType,

    #[error("filter.content_type `{0}` is not a valid header value")]
    InvalidContentType(String),

    #[error("{field} `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.address `{0}` is not a valid host:port")]
    InvalidUpstream(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Check every semantic rule and report all violations.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let content_type = &config.filter.content_type;
    if content_type.trim().is_empty() {
        errors.push(ValidationError::EmptyContentType);
    } else if HeaderValue::from_str(content_type).is_err() {
        errors.push(ValidationError::InvalidContentType(content_type.clone()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if let Err(e) = parse_upstream(&config.upstream.address) {
        errors.push(e);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::Zero("limits.max_body_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse `upstream.address` into the authority requests are sent to.
pub fn parse_upstream(address: &str) -> Result<Authority, ValidationError> {
    match address.parse::<Authority>() {
        Ok(authority) if authority.port_u16().is_some() => Ok(authority),
        _ => Err(ValidationError::InvalidUpstream(address.to_string())),
    }
}
