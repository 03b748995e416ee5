//! Typed error kinds for the HPYLM context tree.
//!
//! Mirrors the fatal-error taxonomy of the add/remove/probability contract:
//! callers either hit a programming error (insufficient context, a missing
//! node during removal) or a corrupted invariant, and those are distinct
//! from the locally-recovered cases (underflow, absent dish) which never
//! surface as `Err`.

use thiserror::Error;

/// Fatal errors raised by [`crate::HPYLM`] and [`crate::Node`] operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An add/remove/probability call did not have enough preceding tokens
    /// to fill the model's context window.
    #[error("insufficient context: need {needed} preceding tokens, got {available}")]
    InsufficientContext {
        /// Tokens required (the model depth).
        needed: usize,
        /// Tokens actually available before the query position.
        available: usize,
    },

    /// A `remove_customer_at_timestep` call traced back to a context with no
    /// matching subtree; this indicates a prior add/remove pairing was
    /// broken.
    #[error("no node found for context at timestep {timestep}")]
    MissingNode {
        /// Timestep at which removal was attempted.
        timestep: usize,
    },

    /// A restaurant's arrangement violated an invariant (empty vector, a
    /// zero-count table) after a mutating operation.
    #[error("invariant violated at node depth {depth}: {detail}")]
    InvariantViolation {
        /// Depth of the offending node.
        depth: usize,
        /// Human-readable description of which invariant failed.
        detail: String,
    },

    /// Persisted state could not be parsed.
    #[error("failed to deserialize model: {0}")]
    DeserializationError(String),
}

/// Convenience alias for fallible `hpylm-core` operations.
pub type Result<T> = std::result::Result<T, Error>;
