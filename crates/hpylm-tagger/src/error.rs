//! Error kinds specific to the tagged model and training driver; tree-level
//! failures still surface as [`hpylm_core::Error`] and are wrapped here.

use thiserror::Error;

/// Errors raised while orchestrating a [`crate::TaggedHPYLMSet`] or
/// [`crate::TrainingDriver`].
#[derive(Debug, Error)]
pub enum Error {
    /// A tag id fell outside `0..num_tags`.
    #[error("tag id {tag} out of range for a set of {num_tags} tags")]
    TagOutOfRange {
        /// The offending tag id.
        tag: u32,
        /// Number of configured tags.
        num_tags: usize,
    },

    /// An operation on the underlying context tree failed.
    #[error(transparent)]
    Core(#[from] hpylm_core::Error),
}

/// Convenience alias for fallible `hpylm-tagger` operations.
pub type Result<T> = std::result::Result<T, Error>;
