//! Hierarchical Pitman-Yor context tree primitives: the [`Sampler`], the
//! per-context [`Node`] (a Chinese Restaurant Process restaurant), and the
//! [`HPYLM`] that ties them together into a full n-gram language model.
//!
//! This crate implements only the algorithmic core: the restaurant tree and
//! its sampler. Tag-sequence modeling, corpus loading, and training
//! orchestration live in `hpylm-tagger` and `hpylm-corpus`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    clippy::unwrap_used,
    clippy::expect_used
)]

mod error;
mod hpylm;
mod node;
mod persist;
mod sampler;

pub use error::{Error, Result};
pub use hpylm::HPYLM;
pub use node::{AuxSums, Node, TokenId};
pub use persist::{HpylmSnapshot, NodeSnapshot, FORMAT_VERSION};
pub use sampler::Sampler;
