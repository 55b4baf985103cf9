//! Access logging subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → record.rs (RequestSnapshot taken, start time fixed)
//!     → handler writes through observer.rs (status + byte count)
//!     → redact.rs (password parameter replaced in a new URI value)
//!     → identity.rs (userinfo → `u` query → Basic-Auth)
//!     → record.rs (fields derived, placeholders applied)
//!     → sink.rs (exactly one emit_access / emit_error call)
//! ```
//!
//! # Design Decisions
//! - All state is request scoped; nothing here needs a lock
//! - Redaction never mutates the request, every field reads the redacted URI
//! - The sink is an injected trait object so callers choose the destination

pub mod identity;
pub mod observer;
pub mod record;
pub mod redact;
pub mod sink;

pub use observer::{Flush, ObserverError, ResponseObserver, ResponseWriter};
pub use record::{AccessRecord, RecordBuilder, RequestSnapshot, RequestStart};
pub use sink::{DiagnosticSink, TracingSink};
