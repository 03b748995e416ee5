//! Property tests over `TaggedHPYLMSet`: seating and unseating a sentence
//! always leaves both the tag-trigram and word-trigram models exactly as
//! they were before.

use hpylm_core::Sampler;
use hpylm_tagger::{TaggedHPYLMSet, TaggedSentence, BOS_POS, EOS_POS};
use proptest::prelude::*;

const NUM_TAGS: usize = 5;
const VOCAB: usize = 8;

const FIRST_REAL_TAG: u32 = 2;

prop_compose! {
    fn arb_tagged_sentence()(
        tag in FIRST_REAL_TAG..(NUM_TAGS as u32),
        words in prop::collection::vec(2u32..(VOCAB as u32), 1..10),
    ) -> TaggedSentence {
        let mut word_ids = vec![BOS_POS, BOS_POS];
        word_ids.extend(words);
        word_ids.push(EOS_POS);
        TaggedSentence::with_uniform_interior_tag(word_ids, tag)
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, ..ProptestConfig::default() })]

    /// Adding then removing the same sentence leaves every owned model empty.
    #[test]
    fn add_then_remove_round_trips(sentence in arb_tagged_sentence(), seed in any::<u64>()) {
        let set = TaggedHPYLMSet::new(NUM_TAGS, VOCAB);
        let mut sampler = Sampler::seeded(seed);
        set.add_sentence(&sentence, &mut sampler).unwrap();
        prop_assert!(!set.all_empty());
        set.remove_sentence(&sentence, &mut sampler).unwrap();
        prop_assert!(set.all_empty());
    }
}
