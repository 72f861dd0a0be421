//! Return codes handed back to the host after each filter call.

/// Outcome of a headers call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterHeadersStatus {
    /// Forward the headers and keep iterating.
    Continue,
    /// Hold the headers; the filter will resume the stream from a data call.
    StopIteration,
}

/// Outcome of a data call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDataStatus {
    /// Release everything buffered so far plus this chunk.
    Continue,
    /// Hold this chunk in the host's accumulation buffer and wait for more.
    StopIterationAndBuffer,
}

/// Outcome of a trailers call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTrailersStatus {
    Continue,
}
