//! Test doubles for the host callbacks.

use std::cell::Cell;

use axum::http::HeaderMap;
use bytes::BytesMut;

use crate::filter::callbacks::{BufferCallbacks, DecoderFilterCallbacks};

/// Host stand-in recording how the filter touched its buffer.
#[derive(Debug, Default)]
pub(crate) struct MockCallbacks {
    pub buffer: Option<BytesMut>,
    pub headers: HeaderMap,
    pub buffer_reads: Cell<usize>,
    pub modifications: usize,
}

impl MockCallbacks {
    pub fn with_buffer(bytes: &[u8]) -> Self {
        Self {
            buffer: Some(BytesMut::from(bytes)),
            ..Default::default()
        }
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }
}

impl BufferCallbacks for MockCallbacks {
    fn buffered_body(&self) -> Option<&BytesMut> {
        self.buffer_reads.set(self.buffer_reads.get() + 1);
        self.buffer.as_ref()
    }

    fn modify_buffered_body(&mut self, f: &mut dyn FnMut(&mut BytesMut)) {
        self.modifications += 1;
        if let Some(buffer) = self.buffer.as_mut() {
            f(buffer);
        }
    }
}

impl DecoderFilterCallbacks for MockCallbacks {
    fn request_headers(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}
