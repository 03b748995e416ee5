//! The tagged HPYLM set (one word model per part-of-speech tag, plus a tag
//! trigram model), the external tag-resampling boundary, and the training
//! driver that ties them to a corpus.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, missing_docs)]

mod error;
mod tag_sampler;
mod tagged_set;
mod training;

pub use error::{Error, Result};
pub use tag_sampler::{TagSampler, UniformRetagger};
pub use tagged_set::{TaggedHPYLMSet, TaggedSentence, BOS_POS, EOS_POS};
pub use training::{compute_perplexity, TrainingDriver};
