//! Property tests over corpus loading: every sentence produced carries the
//! boundary padding `load_corpus` promises, and the train/held-out split
//! never drops or duplicates a sentence.

use std::io::Cursor;

use hpylm_core::Sampler;
use hpylm_corpus::{load_corpus, Dictionary};
use proptest::prelude::*;

prop_compose! {
    fn arb_corpus_text()(lines in prop::collection::vec("[a-z]{1,6}( [a-z]{1,6}){0,5}", 0..12)) -> String {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    /// Every loaded sentence starts with two `<bos>` ids and ends with one
    /// `<eos>` id, and the split never gains or loses a sentence.
    #[test]
    fn loaded_sentences_are_boundary_padded(text in arb_corpus_text(), seed in any::<u64>(), split_probability in 0.0f64..1.0) {
        let line_count = text.lines().filter(|l| !l.trim().is_empty()).count();
        let mut dict = Dictionary::new();
        let mut sampler = Sampler::seeded(seed);
        let split = load_corpus(Cursor::new(text), &mut dict, split_probability, &mut sampler).unwrap();

        prop_assert_eq!(split.train.len() + split.held_out.len(), line_count);
        for sentence in split.train.iter().chain(split.held_out.iter()) {
            prop_assert!(sentence.word_ids.len() >= 3);
            prop_assert_eq!(sentence.word_ids[0], 0);
            prop_assert_eq!(sentence.word_ids[1], 0);
            prop_assert_eq!(*sentence.word_ids.last().unwrap(), 1);
        }
    }

    /// A split probability of 0 always keeps every sentence in `train`.
    #[test]
    fn zero_split_probability_keeps_everything_in_train(text in arb_corpus_text(), seed in any::<u64>()) {
        let mut dict = Dictionary::new();
        let mut sampler = Sampler::seeded(seed);
        let split = load_corpus(Cursor::new(text), &mut dict, 0.0, &mut sampler).unwrap();
        prop_assert!(split.held_out.is_empty());
    }
}
