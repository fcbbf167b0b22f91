//! Pairing token error types.

/// Errors that can occur while generating or parsing a pairing token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The input is not two groups of four symbols from the token alphabet.
    #[error("invalid pairing token format")]
    InvalidFormat,

    /// The OS random source failed and no token could be produced.
    #[error("secure random source unavailable: {0}")]
    RandomSource(String),
}
