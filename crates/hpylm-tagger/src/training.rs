//! Initial tag assignment, the Gibbs training sweep, and perplexity
//! evaluation.

use hpylm_core::{Sampler, TokenId};
use hpylm_corpus::Sentence;
use tracing::{info, info_span};

use crate::error::Result;
use crate::tag_sampler::TagSampler;
use crate::tagged_set::{TaggedHPYLMSet, TaggedSentence};

/// Drives the full training lifecycle: random initialization, repeated
/// Gibbs sweeps, and perplexity evaluation against held-out data.
pub struct TrainingDriver {
    tagged_set: TaggedHPYLMSet,
    sentences: Vec<TaggedSentence>,
    first_real_tag: TokenId,
    sampler: Sampler,
}

impl TrainingDriver {
    /// Build a driver over `tagged_set`, ready to have training sentences
    /// prepared via [`TrainingDriver::prepare_for_training`].
    #[must_use]
    pub fn new(tagged_set: TaggedHPYLMSet, first_real_tag: TokenId, sampler: Sampler) -> Self {
        Self { tagged_set, sentences: Vec::new(), first_real_tag, sampler }
    }

    /// The tagged model being trained.
    #[must_use]
    pub fn tagged_set(&self) -> &TaggedHPYLMSet {
        &self.tagged_set
    }

    /// Mutable access, e.g. for [`TaggedHPYLMSet::sample_hyperparams`].
    pub fn tagged_set_mut(&mut self) -> &mut TaggedHPYLMSet {
        &mut self.tagged_set
    }

    /// Currently-assigned tagged sentences.
    #[must_use]
    pub fn sentences(&self) -> &[TaggedSentence] {
        &self.sentences
    }

    /// Assign each training sentence a uniform-random interior tag and seat
    /// its contribution in both HPYLMs. `poll_cancelled` is checked between
    /// sentences so a caller can abort a large initialization early,
    /// leaving every sentence processed so far fully seated.
    pub fn prepare_for_training(
        &mut self,
        raw: &[Sentence],
        mut poll_cancelled: impl FnMut() -> bool,
    ) -> Result<()> {
        let num_tags = self.tagged_set.num_tags() as u32;
        for sentence in raw {
            if poll_cancelled() {
                info!("training preparation cancelled");
                break;
            }
            let tag = self.sampler.uniform_int(i64::from(self.first_real_tag), i64::from(num_tags - 1)) as TokenId;
            let tagged = TaggedSentence::with_uniform_interior_tag(sentence.word_ids.clone(), tag);
            self.tagged_set.add_sentence(&tagged, &mut self.sampler)?;
            self.sentences.push(tagged);
        }
        info!(prepared = self.sentences.len(), "initial tag assignment complete");
        Ok(())
    }

    /// Shuffle sentence order, then for each sentence: remove its current
    /// contribution, ask `tag_sampler` for a new assignment, and re-add.
    /// Polls `poll_cancelled` between sentences, stopping at the next
    /// sentence boundary so every add/remove pair always completes.
    pub fn perform_gibbs_sweep(
        &mut self,
        tag_sampler: &mut dyn TagSampler,
        mut poll_cancelled: impl FnMut() -> bool,
    ) -> Result<()> {
        let span = info_span!("gibbs_sweep", sentences = self.sentences.len());
        let _enter = span.enter();

        let mut order: Vec<usize> = (0..self.sentences.len()).collect();
        shuffle(&mut order, &mut self.sampler);

        let mut resampled = 0usize;
        for idx in order {
            if poll_cancelled() {
                info!(resampled, "gibbs sweep cancelled at sentence boundary");
                break;
            }
            self.tagged_set.remove_sentence(&self.sentences[idx], &mut self.sampler)?;
            let new_tags = tag_sampler.resample_tags(
                &self.sentences[idx].words,
                &self.sentences[idx].tags,
                &self.tagged_set,
                &mut self.sampler,
            );
            self.sentences[idx].tags = new_tags;
            self.tagged_set.add_sentence(&self.sentences[idx], &mut self.sampler)?;
            resampled += 1;
        }
        info!(resampled, "gibbs sweep complete");
        Ok(())
    }

    /// Resample every HPYLM's hyperparameters.
    pub fn sample_hyperparams(&mut self) {
        let mut sampler = std::mem::replace(&mut self.sampler, Sampler::seeded(0));
        self.tagged_set.sample_hyperparams(&mut sampler);
        self.sampler = sampler;
    }

    /// Debug utility: undo every sentence's contribution without discarding
    /// the learned hyperparameters.
    pub fn remove_all_customers(&mut self) -> Result<()> {
        for sentence in &self.sentences {
            self.tagged_set.remove_sentence(sentence, &mut self.sampler)?;
        }
        Ok(())
    }
}

fn shuffle(order: &mut [usize], sampler: &mut Sampler) {
    // Fisher-Yates using the shared sampler, so sweep order is reproducible
    // from the training seed.
    for i in (1..order.len()).rev() {
        let j = sampler.uniform_int(0, i as i64) as usize;
        order.swap(i, j);
    }
}

/// Mean base-2 log-probability of `held_out` under `tagged_set`, and the
/// resulting perplexity `2^(-mean log2 P)`. The exponentiation base matches
/// the log base throughout, so this is a true base-2 perplexity rather
/// than a mix of log bases.
///
/// Each held-out sentence must already carry a tag assignment (e.g. from a
/// prior training run, or a caller-supplied reference tagging); this
/// function only scores word probabilities, it does not tag.
pub fn compute_perplexity(tagged_set: &TaggedHPYLMSet, held_out: &[TaggedSentence]) -> Result<f64> {
    let mut total_log2 = 0.0_f64;
    let mut count = 0usize;
    for sentence in held_out {
        for t in 2..sentence.words.len() {
            let tag = sentence.tags[t];
            let model = tagged_set.word_hpylm(tag)?;
            let ctx = &sentence.words[t - 2..t];
            let p = model.compute_pw_h(sentence.words[t], ctx)?;
            total_log2 += (p + 1e-10).log2();
            count += 1;
        }
    }
    if count == 0 {
        return Ok(f64::INFINITY);
    }
    let mean_log2 = total_log2 / count as f64;
    Ok(2f64.powf(-mean_log2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_sampler::UniformRetagger;

    #[test]
    fn prepare_then_sweep_then_perplexity_runs_end_to_end() {
        let set = TaggedHPYLMSet::new(5, 20);
        let mut driver = TrainingDriver::new(set, 2, Sampler::seeded(42));

        let raw = vec![
            Sentence { word_ids: vec![0, 0, 5, 6, 7, 1] },
            Sentence { word_ids: vec![0, 0, 6, 5, 7, 1] },
        ];
        driver.prepare_for_training(&raw, || false).unwrap();
        assert_eq!(driver.sentences().len(), 2);

        let mut retagger = UniformRetagger::new(2, 5);
        driver.perform_gibbs_sweep(&mut retagger, || false).unwrap();
        driver.sample_hyperparams();

        let held_out = driver.sentences().to_vec();
        let ppl = compute_perplexity(driver.tagged_set(), &held_out).unwrap();
        assert!(ppl.is_finite() && ppl > 0.0);
    }

    #[test]
    fn cancellation_stops_at_sentence_boundary() {
        let set = TaggedHPYLMSet::new(5, 20);
        let mut driver = TrainingDriver::new(set, 2, Sampler::seeded(1));
        let raw = vec![
            Sentence { word_ids: vec![0, 0, 5, 6, 1] },
            Sentence { word_ids: vec![0, 0, 6, 5, 1] },
            Sentence { word_ids: vec![0, 0, 5, 5, 1] },
        ];
        let mut seen = 0;
        driver
            .prepare_for_training(&raw, || {
                seen += 1;
                seen > 2
            })
            .unwrap();
        assert_eq!(driver.sentences().len(), 2);
    }
}
