use crate::types::Attribute;
use thiserror::Error;

/// Result type for amplifier operations
pub type Result<T> = std::result::Result<T, AmpError>;

/// Errors that can occur when talking to the amplifier
#[derive(Error, Debug)]
pub enum AmpError {
    /// A command was issued while no socket is connected
    #[error("Not connected")]
    NotConnected,

    /// I/O error on a live socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A status line matched a response prefix but carried a bad value
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Invalid controller configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A response line whose prefix matched but whose fields could not be coerced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed {attribute} response {line:?}: {reason}")]
pub struct ParseError {
    /// Attribute whose prefix matched
    pub attribute: Attribute,
    /// The raw line as received
    pub line: String,
    /// What was wrong with it
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(attribute: Attribute, line: &str, reason: impl Into<String>) -> Self {
        Self {
            attribute,
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
