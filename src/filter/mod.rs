//! Push envelope conversion filter.
//!
//! # Data Flow
//! ```text
//! request headers ─▶ decode_headers ── content-type == marker? ──▶ StopIteration
//! request chunks  ─▶ decode_data ──── not last ──▶ StopIterationAndBuffer
//!                                 └── last ──▶ envelope → unbind → bind
//!                                              → rewrite headers + body → Continue
//!
//! response headers ─▶ encode_headers ── converted && 200? ──▶ content-type = marker
//! response chunks  ─▶ encode_data ──── last ──▶ body = Ack { ack_id }
//! ```
//!
//! # Design Decisions
//! - One filter and one `TransactionContext` per transaction; the context is
//!   the only state the response phase reads from the request phase
//! - The host owns accumulated bytes and lends them through the callbacks
//!   traits on every call; the filter never stores body data
//! - Every fallible step runs before the first mutation, so a failure at any
//!   stage forwards the original bytes untouched

pub mod callbacks;
pub mod context;
pub mod decoder;
pub mod encoder;
pub mod status;

mod buffer;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::http::{header::CONTENT_TYPE, HeaderMap};

use crate::binding::{Binder, CloudEventsBinder};
use crate::config::FilterConfig;

pub use callbacks::{BufferCallbacks, DecoderFilterCallbacks};
pub use context::TransactionContext;
pub use decoder::{ConvertError, RequestState};
pub use encoder::ResponseState;
pub use status::{FilterDataStatus, FilterHeadersStatus, FilterTrailersStatus};

/// Filter instance for a single transaction.
pub struct EventsConvertFilter<B = CloudEventsBinder> {
    config: Arc<FilterConfig>,
    binder: Arc<B>,
    request: RequestState,
    response: ResponseState,
}

impl<B: Binder> EventsConvertFilter<B> {
    /// Create a filter for a new transaction.
    pub fn new(config: Arc<FilterConfig>, binder: Arc<B>) -> Self {
        Self {
            config,
            binder,
            request: RequestState::Idle,
            response: ResponseState::Idle,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn request_state(&self) -> RequestState {
        self.request
    }

    pub fn response_state(&self) -> ResponseState {
        self.response
    }

    /// A request carries an envelope iff its content type equals the marker.
    fn is_envelope(&self, headers: &HeaderMap) -> bool {
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == self.config.content_type)
    }
}

impl<B> std::fmt::Debug for EventsConvertFilter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsConvertFilter")
            .field("content_type", &self.config.content_type)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish()
    }
}
