//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! filter + host proxy produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (conversion and acknowledgment counters)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Conversion fallbacks are `warn`, per-transaction decisions are `debug`
//! - Request ID (`x-request-id`) is attached to the HTTP trace span
//! - Counters are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
