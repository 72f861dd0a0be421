//! Request phase: envelope in, plain HTTP event out.

use axum::http::{
    header::{InvalidHeaderName, InvalidHeaderValue, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue,
};
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, warn};

use crate::binding::{Binder, BindingError, HttpMessage};
use crate::codec;
use crate::filter::buffer::{build_body, replace_body};
use crate::filter::callbacks::DecoderFilterCallbacks;
use crate::filter::context::TransactionContext;
use crate::filter::status::{FilterDataStatus, FilterHeadersStatus, FilterTrailersStatus};
use crate::filter::EventsConvertFilter;
use crate::observability::metrics;

/// Request direction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Headers not seen yet.
    Idle,
    /// Envelope expected; chunks are withheld until the last one.
    Accumulating,
    /// Headers and body were rewritten.
    Converted,
    /// Forwarded as received.
    PassThrough,
}

/// Reasons a complete envelope is forwarded unconverted.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("body is not a push envelope: {0}")]
    Envelope(#[from] prost::DecodeError),

    #[error("pubsub unbind failed: {0}")]
    Unbind(#[source] BindingError),

    #[error("http bind failed: {0}")]
    Bind(#[source] BindingError),

    #[error("bound header name `{0}` is invalid")]
    HeaderName(String, #[source] InvalidHeaderName),

    #[error("bound value of header `{0}` is invalid")]
    HeaderValue(String, #[source] InvalidHeaderValue),
}

impl ConvertError {
    /// Label used for the conversion outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            ConvertError::Envelope(_) => "malformed_envelope",
            ConvertError::Unbind(_) => "unbind_failed",
            ConvertError::Bind(_) => "bind_failed",
            ConvertError::HeaderName(..) | ConvertError::HeaderValue(..) => "invalid_header",
        }
    }
}

/// Fully validated rewrite, ready to apply.
#[derive(Debug)]
struct ConvertedRequest {
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl TryFrom<HttpMessage> for ConvertedRequest {
    type Error = ConvertError;

    fn try_from(message: HttpMessage) -> Result<Self, Self::Error> {
        let headers = message
            .headers
            .into_iter()
            .map(|(name, value)| -> Result<_, ConvertError> {
                let header_name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ConvertError::HeaderName(name.clone(), e))?;
                let header_value = HeaderValue::from_str(&value)
                    .map_err(|e| ConvertError::HeaderValue(name, e))?;
                Ok((header_name, header_value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers,
            body: message.body,
        })
    }
}

impl ConvertedRequest {
    /// `content-type` replaces the existing value, every other header is
    /// added next to any value already present.
    fn apply_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if *name == CONTENT_TYPE {
                headers.insert(name.clone(), value.clone());
            } else {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

impl<B: Binder> EventsConvertFilter<B> {
    /// Classify the request. Only requests with a body and the marker
    /// content type are held back.
    pub fn decode_headers(&mut self, headers: &HeaderMap, end_stream: bool) -> FilterHeadersStatus {
        if end_stream || !self.is_envelope(headers) {
            self.request = RequestState::PassThrough;
            return FilterHeadersStatus::Continue;
        }

        debug!(content_type = %self.config.content_type, "Holding push envelope request");
        self.request = RequestState::Accumulating;
        FilterHeadersStatus::StopIteration
    }

    /// Handle one request chunk.
    ///
    /// Chunks before the last are withheld. On the last chunk the complete
    /// envelope is converted and, if every stage succeeds, the request
    /// headers and body are rewritten. Any failure forwards the envelope as
    /// received.
    pub fn decode_data(
        &mut self,
        cx: &mut TransactionContext,
        data: &mut BytesMut,
        end_stream: bool,
        callbacks: Option<&mut dyn DecoderFilterCallbacks>,
    ) -> FilterDataStatus {
        if self.request != RequestState::Accumulating {
            return FilterDataStatus::Continue;
        }

        if !end_stream {
            return FilterDataStatus::StopIterationAndBuffer;
        }

        // One attempt per request, whatever the outcome.
        self.request = RequestState::PassThrough;

        let Some(callbacks) = callbacks else {
            warn!("Decoder callbacks unavailable, forwarding envelope unchanged");
            metrics::record_conversion("no_callbacks");
            return FilterDataStatus::Continue;
        };

        let body = build_body(callbacks.buffered_body(), data);
        let converted = match self.convert(cx, &body) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(error = %e, "Forwarding envelope unchanged");
                metrics::record_conversion(e.outcome());
                return FilterDataStatus::Continue;
            }
        };

        converted.apply_headers(callbacks.request_headers());
        replace_body(data, Some(callbacks), &converted.body);

        cx.mark_converted();
        self.request = RequestState::Converted;
        metrics::record_conversion("converted");
        debug!(
            ack_id = cx.ack_id().unwrap_or_default(),
            body_len = converted.body.len(),
            "Envelope converted"
        );
        FilterDataStatus::Continue
    }

    pub fn decode_trailers(&mut self, _trailers: &HeaderMap) -> FilterTrailersStatus {
        FilterTrailersStatus::Continue
    }

    /// Decode, unbind, bind and validate. Nothing is mutated except the
    /// recorded ack id.
    fn convert(
        &self,
        cx: &mut TransactionContext,
        body: &[u8],
    ) -> Result<ConvertedRequest, ConvertError> {
        let envelope = codec::decode_envelope(body)?;
        cx.record_ack_id(envelope.ack_id);

        let message = envelope.message.unwrap_or_default();
        let event = self.binder.unbind(&message).map_err(ConvertError::Unbind)?;
        let http = self.binder.bind_http(&event).map_err(ConvertError::Bind)?;
        ConvertedRequest::try_from(http)
    }
}
