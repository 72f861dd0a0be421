//! Facilities the host lends to the filter on each data call.
//!
//! The host owns the accumulation buffer for each direction. It is created
//! the first time a data call returns `StopIterationAndBuffer` and holds every
//! chunk withheld since. When a later call returns `Continue`, the host
//! releases the buffer followed by that call's chunk.

use axum::http::HeaderMap;
use bytes::BytesMut;

/// Access to the accumulation buffer of one direction.
pub trait BufferCallbacks {
    /// Bytes withheld by earlier `StopIterationAndBuffer` returns, if any.
    fn buffered_body(&self) -> Option<&BytesMut>;

    /// Drain and rewrite the accumulation buffer in one step.
    ///
    /// Does nothing when no buffer exists.
    fn modify_buffered_body(&mut self, f: &mut dyn FnMut(&mut BytesMut));
}

/// Request direction facilities.
pub trait DecoderFilterCallbacks: BufferCallbacks {
    /// Headers of the paused request, held by the host since
    /// `decode_headers` returned `StopIteration`.
    fn request_headers(&mut self) -> &mut HeaderMap;
}
