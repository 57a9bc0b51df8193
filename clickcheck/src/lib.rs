//! Clickcheck - email click tracking.
//!
//! This library provides shared modules for the two Clickcheck binaries:
//! - `clicksend`: Builds a tracking link, composes a message and sends it
//! - `clickserve`: Receives clicks on tracking links and records them
//!
//! ## Architecture
//!
//! ```text
//! clicksend: params → link → compose → dispatch → SMTP relay → recipient
//! recipient → click → clickserve → log + parameter record
//! ```
//!
//! The two processes share nothing but the URL format.

pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ident;
pub mod link;
pub mod params;
pub mod sink;
pub mod template;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    AllocError, ConfigError, DecodeError, LinkError, ParseError, TemplateError, TransportError,
};
pub use params::TrackingParameters;
pub use sink::RecordSink;
pub use web::{create_router, AppState, PrefixGate};
