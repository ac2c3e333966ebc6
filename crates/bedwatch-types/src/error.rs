//! Error types for payload decoding in bedwatch-types.

use thiserror::Error;

/// Errors that can occur when decoding the occupancy characteristic payload.
///
/// This error type is platform-agnostic and does not include BLE-specific
/// errors (those belong in bedwatch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The characteristic read returned no bytes at all.
    #[error("empty payload from occupancy characteristic")]
    EmptyPayload,

    /// The payload could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidValue(String),
}

/// Result type alias using bedwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
