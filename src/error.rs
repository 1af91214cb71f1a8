//! Error types for deltavault

use thiserror::Error;

/// Result type alias for deltavault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deltavault
#[derive(Error, Debug)]
pub enum Error {
    /// A read from an input byte stream failed
    #[error("source read error: {message}")]
    Source {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A write to an output byte stream failed
    #[error("sink write error: {message}")]
    Sink {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// An encoded artifact is malformed
    #[error("malformed artifact: {message}")]
    Serialization { message: String },

    /// The reconstructed data does not match the digest carried by the delta
    #[error("reconstructed data does not match the digest carried by the delta")]
    Integrity,

    /// An operation carries an impossible tag, or the end-of-stream marker
    /// is misplaced
    #[error("invalid delta operation: {message}")]
    InvalidOp { message: String },

    /// Storage backend errors
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a source-side read error with context
    pub fn source_read(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Source {
            message: message.into(),
            source,
        }
    }

    /// Create a sink-side write error with context
    pub fn sink_write(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Sink {
            message: message.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid-operation error
    pub fn invalid_op(message: impl Into<String>) -> Self {
        Self::InvalidOp {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
