//! Drives the filter over streamed HTTP bodies.
//!
//! # Responsibilities
//! - Deliver each data frame to the filter with an accurate `end_stream`
//! - Own the accumulation buffer of each direction and apply the filter's
//!   `StopIterationAndBuffer` / `Continue` decisions
//! - Stream untouched directions without buffering
//! - Reframe buffered bodies (`content-length`, trailers)
//!
//! # Design Decisions
//! - One frame of lookahead: a data frame is only handed over once the next
//!   frame (or the end of the body) is known
//! - Buffering is capped per direction; the cap covers withheld bytes only

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{
    header::{CONTENT_LENGTH, TRANSFER_ENCODING},
    HeaderMap, HeaderValue, StatusCode,
};
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame};
use http_body_util::{BodyExt, StreamBody};
use thiserror::Error;

use crate::binding::Binder;
use crate::filter::{
    BufferCallbacks, DecoderFilterCallbacks, EventsConvertFilter, FilterDataStatus,
    FilterHeadersStatus, TransactionContext,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while driving a body through the filter.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("body exceeds the {limit} byte buffering limit")]
    TooLarge { limit: usize },

    #[error("failed to read body: {0}")]
    Body(#[source] BoxError),
}

/// Input of one data call.
#[derive(Debug)]
pub(crate) struct Chunk {
    pub data: BytesMut,
    pub end_stream: bool,
}

impl Chunk {
    fn new(data: Bytes, end_stream: bool) -> Self {
        Self {
            data: BytesMut::from(&data[..]),
            end_stream,
        }
    }
}

/// Splits a body into data calls, holding one frame back.
pub(crate) struct ChunkReader<B> {
    body: B,
    parked: Option<Bytes>,
    trailers: Option<HeaderMap>,
    finished: bool,
}

impl<B> ChunkReader<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    pub(crate) fn new(body: B) -> Self {
        Self {
            body,
            parked: None,
            trailers: None,
            finished: false,
        }
    }

    /// Next data call. The last one always has `end_stream` set, and is
    /// empty when the body carried no data.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Chunk>, DriveError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let frame = match self.body.frame().await {
                Some(frame) => frame.map_err(|e| DriveError::Body(e.into()))?,
                None => return Ok(Some(self.finish())),
            };

            match frame.into_data() {
                Ok(data) => {
                    if let Some(previous) = self.parked.replace(data) {
                        return Ok(Some(Chunk::new(previous, false)));
                    }
                }
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        self.trailers = Some(trailers);
                        return Ok(Some(self.finish()));
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> Chunk {
        self.finished = true;
        Chunk::new(self.parked.take().unwrap_or_default(), true)
    }

    pub(crate) fn into_trailers(self) -> Option<HeaderMap> {
        self.trailers
    }
}

/// Host-owned accumulation buffer of one direction.
#[derive(Debug)]
pub(crate) struct StreamBuffer {
    buffer: Option<BytesMut>,
    limit: usize,
}

impl StreamBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buffer: None,
            limit,
        }
    }

    /// Withhold a chunk.
    pub(crate) fn push(&mut self, chunk: BytesMut) -> Result<(), DriveError> {
        let buffered = self.buffer.as_ref().map_or(0, |b| b.len());
        if buffered + chunk.len() > self.limit {
            return Err(DriveError::TooLarge { limit: self.limit });
        }
        self.buffer
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(&chunk);
        Ok(())
    }

    /// Release everything withheld, followed by `chunk`.
    pub(crate) fn release(&mut self, chunk: BytesMut) -> BytesMut {
        match self.buffer.take() {
            Some(mut buffered) => {
                buffered.extend_from_slice(&chunk);
                buffered
            }
            None => chunk,
        }
    }
}

impl BufferCallbacks for StreamBuffer {
    fn buffered_body(&self) -> Option<&BytesMut> {
        self.buffer.as_ref()
    }

    fn modify_buffered_body(&mut self, f: &mut dyn FnMut(&mut BytesMut)) {
        if let Some(buffer) = self.buffer.as_mut() {
            f(buffer);
        }
    }
}

/// Request direction: the buffer plus the paused request headers.
struct RequestStream<'h> {
    buffer: StreamBuffer,
    headers: &'h mut HeaderMap,
}

impl BufferCallbacks for RequestStream<'_> {
    fn buffered_body(&self) -> Option<&BytesMut> {
        self.buffer.buffered_body()
    }

    fn modify_buffered_body(&mut self, f: &mut dyn FnMut(&mut BytesMut)) {
        self.buffer.modify_buffered_body(f);
    }
}

impl DecoderFilterCallbacks for RequestStream<'_> {
    fn request_headers(&mut self) -> &mut HeaderMap {
        self.headers
    }
}

/// Run the request phase. Returns the body to forward upstream; `headers`
/// are updated in place.
pub async fn drive_request<T, B>(
    filter: &mut EventsConvertFilter<T>,
    cx: &mut TransactionContext,
    headers: &mut HeaderMap,
    body: B,
    limit: usize,
) -> Result<Body, DriveError>
where
    T: Binder,
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError>,
{
    let end_stream = body.is_end_stream();
    if filter.decode_headers(headers, end_stream) == FilterHeadersStatus::Continue {
        return Ok(Body::new(body));
    }

    let mut reader = ChunkReader::new(body);
    let mut stream = RequestStream {
        buffer: StreamBuffer::new(limit),
        headers: &mut *headers,
    };
    let mut released = BytesMut::new();
    while let Some(mut chunk) = reader.next_chunk().await? {
        match filter.decode_data(cx, &mut chunk.data, chunk.end_stream, Some(&mut stream)) {
            FilterDataStatus::StopIterationAndBuffer => stream.buffer.push(chunk.data)?,
            FilterDataStatus::Continue => {
                released.extend_from_slice(&stream.buffer.release(chunk.data));
            }
        }
    }
    released.extend_from_slice(&stream.buffer.release(BytesMut::new()));

    let trailers = reader.into_trailers();
    if let Some(trailers) = &trailers {
        filter.decode_trailers(trailers);
    }
    Ok(reframe(headers, released.freeze(), trailers))
}

/// Run the response phase. Returns the body to send downstream; `headers`
/// are updated in place.
pub async fn drive_response<T, B>(
    filter: &mut EventsConvertFilter<T>,
    cx: &TransactionContext,
    status: StatusCode,
    headers: &mut HeaderMap,
    body: B,
    limit: usize,
) -> Result<Body, DriveError>
where
    T: Binder,
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError>,
{
    let end_stream = body.is_end_stream();
    filter.encode_headers(cx, status, headers, end_stream);
    if !filter.wants_response_body() {
        return Ok(Body::new(body));
    }

    let mut reader = ChunkReader::new(body);
    let mut buffer = StreamBuffer::new(limit);
    let mut released = BytesMut::new();
    while let Some(mut chunk) = reader.next_chunk().await? {
        match filter.encode_data(cx, &mut chunk.data, chunk.end_stream, Some(&mut buffer)) {
            FilterDataStatus::StopIterationAndBuffer => buffer.push(chunk.data)?,
            FilterDataStatus::Continue => {
                released.extend_from_slice(&buffer.release(chunk.data));
            }
        }
    }
    released.extend_from_slice(&buffer.release(BytesMut::new()));

    let trailers = reader.into_trailers();
    if let Some(trailers) = &trailers {
        filter.encode_trailers(trailers);
    }
    Ok(reframe(headers, released.freeze(), trailers))
}

/// Frame a fully assembled body and fix the framing headers to match.
fn reframe(headers: &mut HeaderMap, body: Bytes, trailers: Option<HeaderMap>) -> Body {
    headers.remove(TRANSFER_ENCODING);
    match trailers {
        None => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            Body::from(body)
        }
        Some(trailers) => {
            headers.remove(CONTENT_LENGTH);
            let frames = [
                Ok::<_, Infallible>(Frame::data(body)),
                Ok(Frame::trailers(trailers)),
            ];
            Body::new(StreamBody::new(futures_util::stream::iter(frames)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::header::CONTENT_TYPE;
    use prost::Message;

    use crate::binding::CloudEventsBinder;
    use crate::codec::{self, PubsubMessage, ReceivedMessage};
    use crate::config::FilterConfig;

    const MARKER: &str = "application/x-marker";

    type TestBody = StreamBody<futures_util::stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, Infallible>>>>;

    fn frames(chunks: &[&[u8]], trailers: Option<HeaderMap>) -> TestBody {
        let mut frames: Vec<Result<Frame<Bytes>, Infallible>> = chunks
            .iter()
            .map(|chunk| Ok(Frame::data(Bytes::copy_from_slice(chunk))))
            .collect();
        if let Some(trailers) = trailers {
            frames.push(Ok(Frame::trailers(trailers)));
        }
        StreamBody::new(futures_util::stream::iter(frames))
    }

    fn filter() -> EventsConvertFilter {
        let config = FilterConfig {
            content_type: MARKER.to_string(),
        };
        EventsConvertFilter::new(Arc::new(config), Arc::new(CloudEventsBinder))
    }

    fn envelope(ack_id: &str) -> Vec<u8> {
        let mut message = PubsubMessage {
            data: Bytes::from_static(b"payload"),
            ..Default::default()
        };
        for (name, value) in [
            ("ce-specversion", "1.0"),
            ("ce-id", "evt-1"),
            ("ce-source", "/topics/demo"),
            ("ce-type", "com.example.demo"),
            ("ce-datacontenttype", "text/plain"),
        ] {
            message.attributes.insert(name.to_string(), value.to_string());
        }
        ReceivedMessage {
            ack_id: ack_id.to_string(),
            message: Some(message),
            delivery_attempt: 1,
        }
        .encode_to_vec()
    }

    async fn collect(body: Body) -> Bytes {
        body.collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_reader_flags_only_the_last_chunk() {
        let mut reader = ChunkReader::new(frames(&[b"a", b"b", b"c"], None));

        let mut seen = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            seen.push((chunk.data.to_vec(), chunk.end_stream));
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), false),
                (b"b".to_vec(), false),
                (b"c".to_vec(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_reader_emits_empty_last_chunk_for_empty_body() {
        let mut reader = ChunkReader::new(frames(&[], None));

        let chunk = reader.next_chunk().await.unwrap().unwrap();
        assert!(chunk.data.is_empty());
        assert!(chunk.end_stream);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_keeps_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("0"));
        let mut reader = ChunkReader::new(frames(&[b"a", b"b"], Some(trailers.clone())));

        assert!(!reader.next_chunk().await.unwrap().unwrap().end_stream);
        assert!(reader.next_chunk().await.unwrap().unwrap().end_stream);
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.into_trailers(), Some(trailers));
    }

    #[test]
    fn test_stream_buffer_enforces_limit() {
        let mut buffer = StreamBuffer::new(4);
        buffer.push(BytesMut::from(&b"abc"[..])).unwrap();
        assert!(matches!(
            buffer.push(BytesMut::from(&b"de"[..])),
            Err(DriveError::TooLarge { limit: 4 })
        ));
        assert_eq!(&buffer.release(BytesMut::from(&b"!"[..]))[..], b"abc!");
        assert!(buffer.buffered_body().is_none());
    }

    #[tokio::test]
    async fn test_request_envelope_spread_over_frames_is_converted() {
        let mut filter = filter();
        let mut cx = TransactionContext::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MARKER));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let envelope = envelope("ack-7");
        let (a, rest) = envelope.split_at(5);
        let (b, c) = rest.split_at(rest.len() / 2);
        let body = drive_request(&mut filter, &mut cx, &mut headers, frames(&[a, b, c], None), 1024)
            .await
            .unwrap();

        assert_eq!(&collect(body).await[..], b"payload");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
        assert_eq!(headers["ce-id"], "evt-1");
        assert_eq!(headers[CONTENT_LENGTH], "7");
        assert!(headers.get(TRANSFER_ENCODING).is_none());
        assert_eq!(cx.ack_id(), Some("ack-7"));
        assert!(cx.is_converted());
    }

    #[tokio::test]
    async fn test_request_with_other_content_type_is_streamed() {
        let mut filter = filter();
        let mut cx = TransactionContext::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = drive_request(&mut filter, &mut cx, &mut headers, frames(&[b"{\"a\":", b"1}"], None), 1)
            .await
            .unwrap();

        assert_eq!(&collect(body).await[..], b"{\"a\":1}");
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(!cx.is_converted());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_forwarded_byte_for_byte() {
        let mut filter = filter();
        let mut cx = TransactionContext::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MARKER));

        let body = drive_request(
            &mut filter,
            &mut cx,
            &mut headers,
            frames(&[b"not a ", b"protobuf"], None),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(&collect(body).await[..], b"not a protobuf");
        assert_eq!(headers[CONTENT_TYPE], MARKER);
        assert!(!cx.is_converted());
    }

    #[tokio::test]
    async fn test_request_over_limit_is_rejected() {
        let mut filter = filter();
        let mut cx = TransactionContext::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MARKER));

        let result = drive_request(
            &mut filter,
            &mut cx,
            &mut headers,
            frames(&[b"0123456789", b"0123456789", b"end"], None),
            12,
        )
        .await;

        assert!(matches!(result, Err(DriveError::TooLarge { limit: 12 })));
    }

    #[tokio::test]
    async fn test_accepted_response_is_replaced_by_ack() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));

        let body = drive_response(
            &mut filter,
            &cx,
            StatusCode::OK,
            &mut headers,
            frames(&[b"hello", b" world"], None),
            1024,
        )
        .await
        .unwrap();

        let ack = codec::encode_ack("ack-7");
        assert_eq!(collect(body).await, ack);
        assert_eq!(headers[CONTENT_TYPE], MARKER);
        assert_eq!(headers[CONTENT_LENGTH], ack.len().to_string().as_str());
    }

    #[tokio::test]
    async fn test_accepted_empty_response_still_gets_ack() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();

        let body = drive_response(&mut filter, &cx, StatusCode::OK, &mut headers, frames(&[], None), 1024)
            .await
            .unwrap();

        assert_eq!(collect(body).await, codec::encode_ack("ack-7"));
    }

    #[tokio::test]
    async fn test_accepted_response_larger_than_limit_is_acknowledged() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("40"));

        let chunk = [b'x'; 10];
        let body = drive_response(
            &mut filter,
            &cx,
            StatusCode::OK,
            &mut headers,
            frames(&[&chunk[..], &chunk[..], &chunk[..], &chunk[..]], None),
            16,
        )
        .await
        .unwrap();

        let ack = codec::encode_ack("ack-7");
        assert_eq!(collect(body).await, ack);
        assert_eq!(headers[CONTENT_LENGTH], ack.len().to_string().as_str());
    }

    #[tokio::test]
    async fn test_acknowledged_response_drops_upstream_encoding() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();
        headers.insert("content-encoding", HeaderValue::from_static("gzip"));

        let body = drive_response(
            &mut filter,
            &cx,
            StatusCode::OK,
            &mut headers,
            frames(&[b"\x1f\x8b compressed"], None),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(collect(body).await, codec::encode_ack("ack-7"));
        assert!(headers.get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn test_rejected_response_is_streamed_unchanged() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let body = drive_response(
            &mut filter,
            &cx,
            StatusCode::NOT_FOUND,
            &mut headers,
            frames(&[b"not ", b"found"], None),
            1,
        )
        .await
        .unwrap();

        assert_eq!(&collect(body).await[..], b"not found");
        assert_eq!(headers[CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn test_response_trailers_survive_rewrite() {
        let mut filter = filter();
        let cx = TransactionContext::with_conversion("ack-7");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4"));
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("0"));

        let body = drive_response(
            &mut filter,
            &cx,
            StatusCode::OK,
            &mut headers,
            frames(&[b"body"], Some(trailers.clone())),
            1024,
        )
        .await
        .unwrap();

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.trailers(), Some(&trailers));
        assert_eq!(collected.to_bytes(), codec::encode_ack("ack-7"));
        assert!(headers.get(CONTENT_LENGTH).is_none());
    }
}
