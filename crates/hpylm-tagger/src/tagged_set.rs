//! `TaggedHPYLMSet`: one HPYLM per part-of-speech tag over words, plus one
//! HPYLM over tag trigrams.

use std::fs;
use std::path::Path;

use hpylm_core::{Sampler, TokenId, HPYLM};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Manifest written alongside the per-model files in
/// [`TaggedHPYLMSet::save_to_dir`], recording enough to reconstruct the set
/// shape before loading each HPYLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    num_tags: usize,
    vocab_size: usize,
}

/// Reserved tag id for beginning-of-sentence.
pub const BOS_POS: TokenId = 0;
/// Reserved tag id for end-of-sentence.
pub const EOS_POS: TokenId = 1;

/// A sentence together with its current tag assignment, the unit both
/// training and perplexity evaluation operate on. Word and tag sequences
/// must have equal length and share the sentence-boundary padding scheme
/// (`hpylm_corpus::Sentence`).
#[derive(Debug, Clone)]
pub struct TaggedSentence {
    /// Interned word ids, boundary-padded.
    pub words: Vec<TokenId>,
    /// Tag ids, one per word, boundary-padded with [`BOS_POS`]/[`EOS_POS`].
    pub tags: Vec<TokenId>,
}

impl TaggedSentence {
    /// Build from boundary-padded words, assigning `tag` to every interior
    /// (non-boundary) position. Used by [`crate::TrainingDriver::prepare_for_training`].
    #[must_use]
    pub fn with_uniform_interior_tag(words: Vec<TokenId>, tag: TokenId) -> Self {
        let len = words.len();
        let mut tags = vec![tag; len];
        if len >= 2 {
            tags[0] = BOS_POS;
            tags[1] = BOS_POS;
        }
        if let Some(last) = tags.last_mut() {
            *last = EOS_POS;
        }
        Self { words, tags }
    }
}

/// N+1 HPYLM instances: one over tag trigrams (`pos_hpylm`) and one per tag
/// over word trigrams (`word_hpylm[tag]`).
pub struct TaggedHPYLMSet {
    pos_hpylm: HPYLM,
    word_hpylm: Vec<HPYLM>,
    num_tags: usize,
    vocab_size: usize,
}

impl TaggedHPYLMSet {
    /// Build a fresh set for `num_tags` part-of-speech tags (including the
    /// two reserved boundary tags) over a vocabulary of `vocab_size` words.
    #[must_use]
    pub fn new(num_tags: usize, vocab_size: usize) -> Self {
        assert!(num_tags >= 2, "num_tags must include the reserved boundary tags");
        let tag_g0 = 1.0 / num_tags as f64;
        let word_g0 = 1.0 / vocab_size as f64;
        Self {
            pos_hpylm: HPYLM::new(3, tag_g0),
            word_hpylm: (0..num_tags).map(|_| HPYLM::new(3, word_g0)).collect(),
            num_tags,
            vocab_size,
        }
    }

    /// Number of configured tags.
    #[must_use]
    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Configured vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// The tag-trigram model.
    #[must_use]
    pub fn pos_hpylm(&self) -> &HPYLM {
        &self.pos_hpylm
    }

    /// The per-tag word-trigram model for `tag`.
    pub fn word_hpylm(&self, tag: TokenId) -> Result<&HPYLM> {
        self.word_hpylm
            .get(tag as usize)
            .ok_or(Error::TagOutOfRange { tag, num_tags: self.num_tags })
    }

    fn check_tag(&self, tag: TokenId) -> Result<()> {
        if (tag as usize) < self.num_tags {
            Ok(())
        } else {
            Err(Error::TagOutOfRange { tag, num_tags: self.num_tags })
        }
    }

    /// Seat every interior position of `sentence` in both `pos_hpylm` and
    /// the appropriate `word_hpylm[tag]`.
    pub fn add_sentence(&self, sentence: &TaggedSentence, sampler: &mut Sampler) -> Result<()> {
        for t in 2..sentence.words.len() {
            self.check_tag(sentence.tags[t])?;
            self.pos_hpylm.add_customer_at_timestep(&sentence.tags, t, sampler)?;
            self.word_hpylm[sentence.tags[t] as usize].add_customer_at_timestep(&sentence.words, t, sampler)?;
        }
        Ok(())
    }

    /// Undo every seating performed by [`TaggedHPYLMSet::add_sentence`] for
    /// this exact `sentence`.
    pub fn remove_sentence(&self, sentence: &TaggedSentence, sampler: &mut Sampler) -> Result<()> {
        for t in 2..sentence.words.len() {
            self.check_tag(sentence.tags[t])?;
            self.pos_hpylm.remove_customer_at_timestep(&sentence.tags, t, sampler)?;
            self.word_hpylm[sentence.tags[t] as usize].remove_customer_at_timestep(&sentence.words, t, sampler)?;
        }
        Ok(())
    }

    /// Resample hyperparameters of every owned HPYLM.
    pub fn sample_hyperparams(&mut self, sampler: &mut Sampler) {
        self.pos_hpylm.sample_hyperparams(sampler);
        for (tag, model) in self.word_hpylm.iter_mut().enumerate() {
            model.sample_hyperparams(sampler);
            debug!(tag, "resampled word HPYLM hyperparameters");
        }
    }

    /// Ranked `(word_id, count)` pairs most frequently seated directly at
    /// `tag`'s root restaurant.
    pub fn top_words_for_tag(&self, tag: TokenId, limit: usize) -> Result<Vec<(TokenId, u32)>> {
        Ok(self.word_hpylm(tag)?.top_dishes_at_root(limit))
    }

    /// True once every customer has been removed from every owned model,
    /// without discarding the trained hyperparameters. Used to confirm a
    /// full undo of every sentence that was added, rather than silently
    /// trusting caller bookkeeping.
    #[must_use]
    pub fn all_empty(&self) -> bool {
        self.pos_hpylm.get_num_customers() == 0
            && self.word_hpylm.iter().all(|m| m.get_num_customers() == 0)
    }

    /// Persist every owned HPYLM plus a manifest to `dir`, creating it if
    /// needed. Does not persist the dictionary, which the caller owns (see
    /// `hpylm-corpus::Dictionary`).
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| hpylm_core::Error::DeserializationError(format!("creating {}: {e}", dir.display())))?;
        let manifest = Manifest { num_tags: self.num_tags, vocab_size: self.vocab_size };
        let manifest_path = dir.join("manifest.json");
        let manifest_file = fs::File::create(&manifest_path)
            .map_err(|e| hpylm_core::Error::DeserializationError(format!("creating manifest: {e}")))?;
        serde_json::to_writer_pretty(manifest_file, &manifest)
            .map_err(|e| hpylm_core::Error::DeserializationError(format!("writing manifest: {e}")))?;

        self.pos_hpylm.save(&dir.join("pos.cbor"))?;
        for (tag, model) in self.word_hpylm.iter().enumerate() {
            model.save(&dir.join(format!("word_tag_{tag}.cbor")))?;
        }
        Ok(())
    }

    /// Reload a set previously written by [`TaggedHPYLMSet::save_to_dir`].
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let manifest_file = fs::File::open(dir.join("manifest.json"))
            .map_err(|e| hpylm_core::Error::DeserializationError(format!("opening manifest: {e}")))?;
        let manifest: Manifest = serde_json::from_reader(manifest_file)
            .map_err(|e| hpylm_core::Error::DeserializationError(format!("parsing manifest: {e}")))?;

        let pos_hpylm = HPYLM::load(&dir.join("pos.cbor"))?;
        let mut word_hpylm = Vec::with_capacity(manifest.num_tags);
        for tag in 0..manifest.num_tags {
            word_hpylm.push(HPYLM::load(&dir.join(format!("word_tag_{tag}.cbor")))?);
        }
        Ok(Self { pos_hpylm, word_hpylm, num_tags: manifest.num_tags, vocab_size: manifest.vocab_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: Vec<TokenId>, tag: TokenId) -> TaggedSentence {
        TaggedSentence::with_uniform_interior_tag(words, tag)
    }

    #[test]
    fn add_then_remove_leaves_models_empty() {
        let set = TaggedHPYLMSet::new(4, 10);
        let mut sampler = Sampler::seeded(1);
        let sent = sentence(vec![BOS_POS as TokenId, BOS_POS as TokenId, 2, 3, 4, 1], 2);
        set.add_sentence(&sent, &mut sampler).unwrap();
        assert!(!set.all_empty());
        set.remove_sentence(&sent, &mut sampler).unwrap();
        assert!(set.all_empty());
    }

    #[test]
    fn out_of_range_tag_is_rejected() {
        let set = TaggedHPYLMSet::new(3, 5);
        let mut sampler = Sampler::seeded(1);
        let sent = sentence(vec![0, 0, 1, 1], 9);
        let err = set.add_sentence(&sent, &mut sampler).unwrap_err();
        assert!(matches!(err, Error::TagOutOfRange { tag: 9, .. }));
    }

    #[test]
    fn save_and_load_round_trip() {
        let set = TaggedHPYLMSet::new(4, 10);
        let mut sampler = Sampler::seeded(1);
        let sent = sentence(vec![0, 0, 2, 3, 4, 1], 2);
        set.add_sentence(&sent, &mut sampler).unwrap();

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("hpylm-tagger-test-{nanos}"));
        set.save_to_dir(&dir).unwrap();
        let reloaded = TaggedHPYLMSet::load_from_dir(&dir).unwrap();

        assert_eq!(reloaded.num_tags(), set.num_tags());
        assert_eq!(reloaded.vocab_size(), set.vocab_size());
        let a = set.word_hpylm(2).unwrap().compute_pw_h(3, &[0, 2]).unwrap();
        let b = reloaded.word_hpylm(2).unwrap().compute_pw_h(3, &[0, 2]).unwrap();
        assert!((a - b).abs() < 1e-12);

        fs::remove_dir_all(&dir).ok();
    }
}
