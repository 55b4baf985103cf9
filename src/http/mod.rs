//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, peer address capture)
//!     → middleware/access_log.rs (snapshot, panic recovery, observed body)
//!     → echo handler
//!     → response streamed back through the observer
//!     → one record to the sink
//! ```

pub mod middleware;
pub mod server;

pub use middleware::access_log_middleware;
pub use server::HttpServer;
