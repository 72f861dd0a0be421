//! Per-transaction state shared from the request phase to the response phase.

/// Written once by the request phase, read by the response phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionContext {
    ack_id: Option<String>,
    converted: bool,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of a transaction whose request has already been converted.
    pub fn with_conversion(ack_id: impl Into<String>) -> Self {
        Self {
            ack_id: Some(ack_id.into()),
            converted: true,
        }
    }

    /// Acknowledgment identifier of the decoded envelope.
    pub fn ack_id(&self) -> Option<&str> {
        self.ack_id.as_deref()
    }

    /// True once headers and body of the request were rewritten.
    pub fn is_converted(&self) -> bool {
        self.converted
    }

    pub(crate) fn record_ack_id(&mut self, ack_id: String) {
        self.ack_id = Some(ack_id);
    }

    /// A conversion only counts once an identifier is known.
    pub(crate) fn mark_converted(&mut self) {
        self.converted = self.ack_id.is_some();
    }
}
