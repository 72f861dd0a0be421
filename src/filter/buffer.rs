//! Body helpers shared by both directions.

use bytes::BytesMut;

use crate::filter::callbacks::BufferCallbacks;

/// Join the host's accumulated bytes with the final chunk.
pub(crate) fn build_body(buffered: Option<&BytesMut>, last: &[u8]) -> BytesMut {
    let buffered_len = buffered.map_or(0, |b| b.len());
    let mut body = BytesMut::with_capacity(buffered_len + last.len());
    if let Some(buffered) = buffered {
        body.extend_from_slice(buffered);
    }
    body.extend_from_slice(last);
    body
}

/// Make `body` the only content the host will release.
///
/// The final chunk is always drained. The replacement lands in the host's
/// accumulation buffer when one exists, otherwise in the chunk itself.
pub(crate) fn replace_body<C>(last: &mut BytesMut, callbacks: Option<&mut C>, body: &[u8])
where
    C: BufferCallbacks + ?Sized,
{
    last.clear();
    match callbacks {
        Some(callbacks) if callbacks.buffered_body().is_some() => {
            callbacks.modify_buffered_body(&mut |buffered: &mut BytesMut| {
                buffered.clear();
                buffered.extend_from_slice(body);
            });
        }
        _ => last.extend_from_slice(body),
    }
}
