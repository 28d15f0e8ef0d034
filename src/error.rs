//! Typed error taxonomy.
//!
//! Errors are split by where they surface: [`EngineError`] aborts the whole
//! process before or while the event loop is running, [`ConnError`] is scoped
//! to a single connection and never brings the server down.

use thiserror::Error;

use crate::config::parser::ConfigError;
use crate::config::validate::ConfigValidationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse command line: {0}")]
    Cli(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    ConfigValidation(#[from] ConfigValidationError),

    #[error("no usable server blocks remained after validation")]
    NoValidServers,

    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register poll interest: {0}")]
    Poll(#[source] std::io::Error),

    #[error("privilege drop failed: {0}")]
    PrivilegeDrop(String),

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("chroot failed: {0}")]
    Chroot(#[source] std::io::Error),

    #[error("signal handler setup failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure while servicing a single connection. Always resolves to either an
/// HTTP status response or an immediate close; never propagates past the
/// connection it occurred on.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("incomplete request line")]
    Incomplete,

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("unsupported or invalid method")]
    InvalidMethod,

    #[error("request line or header is not valid UTF-8")]
    InvalidUtf8,

    #[error("header line too long")]
    HeaderTooLong,

    #[error("too many headers")]
    TooManyHeaders,

    #[error("invalid header name")]
    InvalidHeaderName,

    #[error("invalid header value")]
    InvalidHeaderValue,

    #[error("duplicate header with conflicting values: {0}")]
    DuplicateHeader(String),

    #[error("missing required Host header")]
    MissingHost,

    #[error("invalid chunk size")]
    InvalidChunkSize,

    #[error("unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("request body exceeds configured limit")]
    PayloadTooLarge,

    #[error("request line or headers exceed configured limit")]
    RequestTooLarge,

    #[error("write buffer exceeded hard cap")]
    WriteBufferOverflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConnError {
    /// Maps a parse/connection failure onto the response status the
    /// dispatcher should send before the socket is torn down. `None` means no
    /// response can be synthesized and the connection must simply close.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ConnError::Incomplete => None,
            ConnError::MalformedRequestLine => Some(400),
            ConnError::InvalidMethod => Some(400),
            ConnError::InvalidUtf8 => Some(400),
            ConnError::HeaderTooLong => Some(400),
            ConnError::TooManyHeaders => Some(400),
            ConnError::InvalidHeaderName => Some(400),
            ConnError::InvalidHeaderValue => Some(400),
            ConnError::DuplicateHeader(_) => Some(400),
            ConnError::MissingHost => Some(400),
            ConnError::InvalidChunkSize => Some(400),
            ConnError::UnsupportedTransferEncoding(_) => Some(501),
            ConnError::PayloadTooLarge => Some(413),
            ConnError::RequestTooLarge => Some(400),
            ConnError::WriteBufferOverflow => None,
            ConnError::Io(_) => None,
        }
    }
}
