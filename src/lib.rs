//! Converts Pub/Sub push envelopes into CloudEvents HTTP requests and
//! acknowledges them on success.

pub mod binding;
pub mod codec;
pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use binding::{Binder, CloudEvent, CloudEventsBinder};
pub use config::schema::ProxyConfig;
pub use filter::{EventsConvertFilter, TransactionContext};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
