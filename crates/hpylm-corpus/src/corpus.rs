//! Line-oriented corpus loading: tokenize, intern, pad with sentence
//! boundaries, and route each sentence to a train/held-out split.
//!
//! One sentence per non-empty line, whitespace-separated tokens, each
//! sentence independently routed to the held-out set with probability
//! `split_probability`.

use std::io::BufRead;

use anyhow::{Context, Result};
use hpylm_core::{Sampler, TokenId};

use crate::dictionary::{Dictionary, BOS, EOS};

/// One interned, boundary-padded sentence: `[<bos>, <bos>, w_0, .., w_n,
/// <eos>]`. Priming with two `<bos>` tokens gives a trigram model full
/// context at the first real word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Interned word ids, including the boundary padding.
    pub word_ids: Vec<TokenId>,
}

impl Sentence {
    /// Number of real (non-padding) tokens, including the trailing `<eos>`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.word_ids.len()
    }

    /// True if this sentence carries no tokens at all (never produced by
    /// [`load_corpus`], but convenient for callers building synthetic
    /// sentences in tests).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.word_ids.is_empty()
    }
}

/// A corpus split into a training set and a held-out set.
#[derive(Debug, Clone, Default)]
pub struct CorpusSplit {
    /// Sentences used for training.
    pub train: Vec<Sentence>,
    /// Sentences held out for perplexity evaluation.
    pub held_out: Vec<Sentence>,
}

/// Read `reader` line by line, intern tokens into `dictionary`, and route
/// each resulting sentence to train or held-out via
/// `sampler.bernoulli(split_probability)`. The first blank line stops
/// reading entirely: it marks the end of the sentence stream, not a
/// separator within it.
pub fn load_corpus<R: BufRead>(
    reader: R,
    dictionary: &mut Dictionary,
    split_probability: f64,
    sampler: &mut Sampler,
) -> Result<CorpusSplit> {
    let mut split = CorpusSplit::default();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading corpus line {}", lineno + 1))?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let mut word_ids = Vec::with_capacity(line.split_whitespace().count() + 3);
        word_ids.push(BOS);
        word_ids.push(BOS);
        for token in line.split_whitespace() {
            word_ids.push(dictionary.intern(token));
        }
        word_ids.push(EOS);

        let sentence = Sentence { word_ids };
        if sampler.bernoulli(split_probability) {
            split.held_out.push(sentence);
        } else {
            split.train.push(sentence);
        }
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pads_with_boundaries_and_interns_tokens() {
        let mut dict = Dictionary::new();
        let mut sampler = Sampler::seeded(1);
        let split = load_corpus(Cursor::new("the dog ran\n"), &mut dict, 0.0, &mut sampler).unwrap();
        assert_eq!(split.train.len(), 1);
        assert!(split.held_out.is_empty());
        let sent = &split.train[0];
        assert_eq!(sent.word_ids[0], BOS);
        assert_eq!(sent.word_ids[1], BOS);
        assert_eq!(*sent.word_ids.last().unwrap(), EOS);
        assert_eq!(sent.len(), 2 + 3 + 1);
    }

    #[test]
    fn blank_line_stops_reading() {
        let mut dict = Dictionary::new();
        let mut sampler = Sampler::seeded(1);
        let split = load_corpus(Cursor::new("a b\n\nc\n"), &mut dict, 0.0, &mut sampler).unwrap();
        assert_eq!(split.train.len(), 1);
    }

    #[test]
    fn split_probability_one_routes_everything_held_out() {
        let mut dict = Dictionary::new();
        let mut sampler = Sampler::seeded(1);
        let split = load_corpus(Cursor::new("a\nb\nc\n"), &mut dict, 1.0, &mut sampler).unwrap();
        assert_eq!(split.train.len(), 0);
        assert_eq!(split.held_out.len(), 3);
    }
}
