//! Error types for the IRC client engine

use thiserror::Error;

/// Main error type for the IRC client engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A wire line could not be parsed
    #[error("Message parsing error: {0}")]
    MessageParse(String),

    /// Malformed capability grammar (ISUPPORT, PREFIX, CHANMODES, MODE)
    #[error("Format error: {0}")]
    Format(String),

    /// The server or the event stream broke an invariant the connection relies on.
    /// Fatal to the connection.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The API was misused by the caller
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Module error: {0}")]
    Module(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    /// Whether this error must tear down the connection it was raised on
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
