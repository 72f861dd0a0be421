//! Response phase: acknowledge deliveries the upstream accepted.

use axum::http::{
    header::{
        CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LOCATION, CONTENT_RANGE, CONTENT_TYPE, ETAG,
        LAST_MODIFIED,
    },
    HeaderMap, HeaderName, HeaderValue, StatusCode,
};
use bytes::BytesMut;
use tracing::{debug, warn};

use crate::binding::Binder;
use crate::codec;
use crate::filter::buffer::replace_body;
use crate::filter::callbacks::BufferCallbacks;
use crate::filter::context::TransactionContext;
use crate::filter::status::{FilterDataStatus, FilterHeadersStatus, FilterTrailersStatus};
use crate::filter::EventsConvertFilter;
use crate::observability::metrics;

/// Upstream headers describing the body the acknowledgment replaces.
const REPLACED_ENTITY_HEADERS: [HeaderName; 6] = [
    CONTENT_ENCODING,
    CONTENT_LANGUAGE,
    CONTENT_LOCATION,
    CONTENT_RANGE,
    ETAG,
    LAST_MODIFIED,
];

/// Response direction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Headers not seen yet.
    Idle,
    /// Armed: the body will be replaced by the acknowledgment.
    Accumulating,
    /// Body was replaced.
    Acknowledged,
    /// Forwarded as received.
    PassThrough,
}

impl<B: Binder> EventsConvertFilter<B> {
    /// Arm acknowledgment rewriting when the request was converted and the
    /// upstream answered exactly 200.
    pub fn encode_headers(
        &mut self,
        cx: &TransactionContext,
        status: StatusCode,
        headers: &mut HeaderMap,
        _end_stream: bool,
    ) -> FilterHeadersStatus {
        if !cx.is_converted() {
            self.response = ResponseState::PassThrough;
            return FilterHeadersStatus::Continue;
        }

        if status != StatusCode::OK {
            warn!(status = %status, "Upstream did not accept the event, response left untouched");
            metrics::record_ack("rejected");
            self.response = ResponseState::PassThrough;
            return FilterHeadersStatus::Continue;
        }

        match HeaderValue::from_str(&self.config.content_type) {
            Ok(content_type) => {
                for name in &REPLACED_ENTITY_HEADERS {
                    headers.remove(name);
                }
                headers.insert(CONTENT_TYPE, content_type);
                self.response = ResponseState::Accumulating;
            }
            Err(e) => {
                warn!(error = %e, "Marker content type is not a valid header value");
                self.response = ResponseState::PassThrough;
            }
        }
        FilterHeadersStatus::Continue
    }

    /// Handle one response chunk. Once armed, upstream bytes are discarded and
    /// the last call leaves the serialized acknowledgment as the only body.
    pub fn encode_data(
        &mut self,
        cx: &TransactionContext,
        data: &mut BytesMut,
        end_stream: bool,
        callbacks: Option<&mut dyn BufferCallbacks>,
    ) -> FilterDataStatus {
        if self.response != ResponseState::Accumulating {
            return FilterDataStatus::Continue;
        }

        // The acknowledgment does not depend on upstream bytes; keep none.
        if !end_stream {
            data.clear();
            return FilterDataStatus::StopIterationAndBuffer;
        }

        let Some(ack_id) = cx.ack_id() else {
            self.response = ResponseState::PassThrough;
            return FilterDataStatus::Continue;
        };

        let ack = codec::encode_ack(ack_id);
        replace_body(data, callbacks, &ack);

        self.response = ResponseState::Acknowledged;
        metrics::record_ack("acknowledged");
        debug!(ack_id, "Response replaced with acknowledgment");
        FilterDataStatus::Continue
    }

    pub fn encode_trailers(&mut self, _trailers: &HeaderMap) -> FilterTrailersStatus {
        FilterTrailersStatus::Continue
    }

    /// Whether the host must hand the response body to `encode_data`.
    /// Otherwise the body can be streamed untouched.
    pub fn wants_response_body(&self) -> bool {
        self.response == ResponseState::Accumulating
    }
}
