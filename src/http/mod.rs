//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeouts)
//!     → driver.rs (request phase: envelope → CloudEvent request)
//!     → upstream
//!     → driver.rs (response phase: 200 → acknowledgment body)
//!     → Send to client
//! ```

pub mod driver;
pub mod server;

pub use driver::{drive_request, drive_response, DriveError};
pub use server::HttpServer;
