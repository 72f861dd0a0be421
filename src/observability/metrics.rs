//! Metrics collection and exposition.
//!
//! # Metrics
//! - `events_convert_requests_total` (counter): completed envelope
//!   conversion attempts by `outcome`
//! - `events_convert_acks_total` (counter): responses of converted requests
//!   by `result` (`acknowledged`, `rejected`)

use std::net::SocketAddr;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONVERSIONS_TOTAL: &str = "events_convert_requests_total";
pub const ACKS_TOTAL: &str = "events_convert_acks_total";

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!(CONVERSIONS_TOTAL, "Completed envelope conversion attempts");
    describe_counter!(ACKS_TOTAL, "Responses to converted requests");
}

pub fn record_conversion(outcome: &'static str) {
    counter!(CONVERSIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_ack(result: &'static str) {
    counter!(ACKS_TOTAL, "result" => result).increment(1);
}
