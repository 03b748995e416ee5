//! The blocked-Gibbs "lattice" boundary.
//!
//! The forward-filtering/backward-sampling lattice that jointly resamples
//! every tag in a sentence given the current HPYLM state is treated as an
//! external collaborator: this module defines only the trait boundary it
//! must satisfy, plus a trivial test double used by this crate's own tests
//! and as a placeholder for callers that have not wired in a real lattice
//! implementation yet.

use hpylm_core::{Sampler, TokenId};

use crate::tagged_set::{TaggedHPYLMSet, BOS_POS, EOS_POS};

/// Jointly resamples the tag assignment of one sentence given the current
/// state of both HPYLMs.
///
/// Implementations must leave the two boundary positions (`BOS_POS` at
/// indices 0 and 1, `EOS_POS` at the last index) untouched and return a
/// tag vector of the same length as `words`.
pub trait TagSampler {
    /// Produce a new tag assignment for `words`, given `current_tags` (the
    /// sentence's tags before this resampling step) and read-only access to
    /// the tagged model.
    fn resample_tags(
        &mut self,
        words: &[TokenId],
        current_tags: &[TokenId],
        tagged_set: &TaggedHPYLMSet,
        sampler: &mut Sampler,
    ) -> Vec<TokenId>;
}

/// A trivial [`TagSampler`] that ignores all model state and assigns each
/// interior position an independent uniform random tag. Not a substitute
/// for the real lattice sampler: it never converges toward a posterior
/// mode, but it exercises the full add/remove/resample plumbing so the
/// training driver can be tested without a lattice implementation.
pub struct UniformRetagger {
    first_real_tag: TokenId,
    num_tags: usize,
}

impl UniformRetagger {
    /// `first_real_tag` is the smallest tag id that isn't a reserved
    /// boundary tag (typically 2, just past [`BOS_POS`]/[`EOS_POS`]).
    #[must_use]
    pub fn new(first_real_tag: TokenId, num_tags: usize) -> Self {
        Self { first_real_tag, num_tags }
    }
}

impl TagSampler for UniformRetagger {
    fn resample_tags(
        &mut self,
        words: &[TokenId],
        current_tags: &[TokenId],
        _tagged_set: &TaggedHPYLMSet,
        sampler: &mut Sampler,
    ) -> Vec<TokenId> {
        let mut tags = current_tags.to_vec();
        debug_assert_eq!(words.len(), tags.len());
        let last = tags.len().saturating_sub(1);
        for (t, tag) in tags.iter_mut().enumerate() {
            if t < 2 || t == last {
                *tag = if t == last { EOS_POS } else { BOS_POS };
                continue;
            }
            let hi = i64::from(self.num_tags as u32) - 1;
            *tag = sampler.uniform_int(i64::from(self.first_real_tag), hi) as TokenId;
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_tags_are_preserved() {
        let set = TaggedHPYLMSet::new(5, 10);
        let mut sampler = Sampler::seeded(1);
        let words = vec![0_u32, 0, 2, 3, 4, 1];
        let tags = vec![BOS_POS, BOS_POS, 2, 2, 2, EOS_POS];
        let mut retagger = UniformRetagger::new(2, 5);
        let new_tags = retagger.resample_tags(&words, &tags, &set, &mut sampler);
        assert_eq!(new_tags[0], BOS_POS);
        assert_eq!(new_tags[1], BOS_POS);
        assert_eq!(*new_tags.last().unwrap(), EOS_POS);
        for &t in &new_tags[2..new_tags.len() - 1] {
            assert!(t >= 2 && (t as usize) < 5);
        }
    }
}
