//! Typed error definitions shared by every stopline crate.
//!
//! Each concern gets its own `thiserror` enum so callers can match on the
//! failure class instead of parsing strings. Application boundaries (the
//! runner, config loading) still wrap these in `anyhow::Result`.

use thiserror::Error;

/// Errors produced by [`Money`](crate::money::Money) construction and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The operation would have produced NaN or an infinite value (division by
    /// zero, overflow). The computation is aborted rather than continued with a
    /// poisoned value.
    #[error("not a number: {0}")]
    NotANumber(String),

    /// The input string is not an exact decimal.
    #[error("invalid decimal '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// A native floating point value was offered where money was expected.
    #[error("float value {0} rejected; money must be given as a string or integer")]
    FloatRejected(String),
}

/// Errors from the position / order-context persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Snapshot file could not be read or written.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot contents could not be encoded or decoded.
    #[error("store snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Configuration and wiring errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Money value in the configuration is invalid.
    #[error("config value error: {0}")]
    Money(#[from] MoneyError),
}
