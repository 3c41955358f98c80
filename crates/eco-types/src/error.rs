//! Error types for data parsing in eco-types.

use thiserror::Error;

/// Errors that can occur when decoding Danfoss Eco characteristic payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in eco-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the fixed part of its layout.
    #[error("Insufficient bytes: expected at least {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes the layout requires.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A field holds a value outside its documented domain.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ParseError {
    /// Fail with [`ParseError::InsufficientBytes`] unless `data` holds at least `expected` bytes.
    pub fn require_len(data: &[u8], expected: usize) -> ParseResult<()> {
        if data.len() < expected {
            Err(ParseError::InsufficientBytes {
                expected,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}

/// Result type alias using eco-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
