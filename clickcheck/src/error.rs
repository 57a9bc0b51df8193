//! Error types shared by the sender and the receiver.
//!
//! Every sender-side error is fatal for the invocation. The only error the
//! receiver recovers from is [`ParseError`], which is logged and otherwise
//! ignored.

use thiserror::Error;

/// Configuration could not be loaded or contains an unusable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("malformed smarthost {value:?}: {reason}")]
    Smarthost { value: String, reason: &'static str },

    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid listen address {value:?}: {source}")]
    Listen {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Template resolution, parsing or rendering failed.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {name:?} not found at {path}")]
    NotFound { name: String, path: String },

    #[error("failed to read template {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("template syntax error at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: &'static str },

    #[error("template references unknown field {0:?}")]
    Render(String),
}

/// A tracking link could not be assembled.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("URL template failed: {0}")]
    Template(#[from] TemplateError),

    #[error("template produced an invalid URL {candidate:?}: {source}")]
    MalformedUrl {
        candidate: String,
        source: url::ParseError,
    },

    #[error("image file {0} doesn't exist")]
    MissingImage(String),

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Sending through the mail relay failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address {value:?}: {reason}")]
    Address { value: String, reason: String },

    #[error("failed to set up relay {host}: {reason}")]
    Relay { host: String, reason: String },

    #[error("failed to send email: {0}")]
    Send(String),

    #[error("failed to write audit record: {0}")]
    Audit(#[from] std::io::Error),
}

/// Inbound form data could not be decoded. Non-fatal.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid percent escape at byte {0}")]
    Escape(usize),

    #[error("failed to read request body: {0}")]
    Body(String),
}

/// The identifier allocator could not issue a new identifier.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("counter file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("counter file {path} holds {content:?}, not a number")]
    Corrupt { path: String, content: String },

    #[error("identifier space exhausted")]
    Exhausted,
}

/// A token could not be decoded back into an identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,

    #[error("invalid character {0:?} in token")]
    InvalidChar(char),

    #[error("token overflows a 64-bit identifier")]
    Overflow,
}
