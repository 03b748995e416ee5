//! Dictionary construction and corpus loading for the HPYLM POS tagger.
//!
//! Tokenization, dictionary construction, and held-out splitting live here
//! rather than in `hpylm-core`, which owns only the context-tree
//! primitives.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, missing_docs)]

mod corpus;
mod dictionary;

pub use corpus::{load_corpus, CorpusSplit, Sentence};
pub use dictionary::{Dictionary, BOS, EOS};
