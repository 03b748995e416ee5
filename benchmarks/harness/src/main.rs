//! hpylm-bench-harness
//!
//! Runs a small end-to-end training benchmark (synthesize corpus -> prepare
//! initial tags -> Gibbs sweeps -> hyperparameter resampling -> perplexity)
//! and appends CSV rows into `benchmarks/reports/bench-<unix>.csv`.
//!
//! Usage examples:
//!   cargo run -p hpylm-bench-harness -- --profile configs/profiles/small.toml
//!   cargo run -p hpylm-bench-harness -- --profile configs/profiles/medium.toml

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Deserialize;

use hpylm_core::Sampler;
use hpylm_tagger::{compute_perplexity, TaggedHPYLMSet, TaggedSentence, TrainingDriver, UniformRetagger};

#[derive(Debug, Deserialize)]
struct Profile {
    /// Number of synthetic training sentences.
    sentences: usize,
    /// Tokens per sentence (excluding BOS/BOS/EOS padding).
    sentence_len: usize,
    /// Vocabulary size (excluding the two reserved boundary ids).
    vocab_size: usize,
    /// Number of part-of-speech tags, including the two reserved boundary tags.
    num_tags: usize,
    /// Gibbs sweeps to run after initialization.
    sweeps: u32,
    /// Repetitions of the whole pipeline.
    repeats: u32,
}

fn parse_flag(name: &str, default: &str) -> String {
    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        if k == format!("--{name}") {
            return it.next().unwrap_or_else(|| default.to_string());
        }
    }
    default.to_string()
}

fn dur_ms(d: Duration) -> u128 {
    d.as_millis()
}

const FIRST_REAL_TAG: u32 = 2;

/// Build `count` synthetic boundary-padded sentences of `len` interior
/// tokens drawn uniformly from `[2, vocab_size + 2)` (ids 0 and 1 are the
/// reserved `<bos>`/`<eos>` word ids, mirroring `hpylm_corpus::Dictionary`).
fn synthesize_sentences(count: usize, len: usize, vocab_size: usize, sampler: &mut Sampler) -> Vec<Vec<u32>> {
    (0..count)
        .map(|_| {
            let mut ids = vec![0_u32, 0];
            for _ in 0..len {
                ids.push(sampler.uniform_int(2, i64::from(vocab_size as u32) + 1) as u32);
            }
            ids.push(1);
            ids
        })
        .collect()
}

fn main() -> Result<()> {
    let profile_path = PathBuf::from(parse_flag("profile", "configs/profiles/small.toml"));

    let profile_src =
        fs::read_to_string(&profile_path).with_context(|| format!("read profile {profile_path:?}"))?;
    let profile: Profile = toml::from_str(&profile_src).context("parse profile toml")?;
    println!(
        "Profile: sentences={}, sentence_len={}, vocab_size={}, num_tags={}, sweeps={}, repeats={}",
        profile.sentences, profile.sentence_len, profile.vocab_size, profile.num_tags, profile.sweeps,
        profile.repeats
    );

    fs::create_dir_all("benchmarks/reports").ok();

    let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let csv_path = PathBuf::from(format!("benchmarks/reports/bench-{ts}.csv"));
    let mut csv = fs::OpenOptions::new().create(true).append(true).open(&csv_path)?;
    writeln!(csv, "timestamp,sentences,vocab_size,num_tags,repeat,stage,ms,extra")?;

    for rep in 0..profile.repeats {
        let mut sampler = Sampler::seeded(u64::from(rep) + 1);
        let raw_words = synthesize_sentences(profile.sentences, profile.sentence_len, profile.vocab_size, &mut sampler);
        let raw: Vec<hpylm_corpus::Sentence> =
            raw_words.into_iter().map(|word_ids| hpylm_corpus::Sentence { word_ids }).collect();

        let tagged_set = TaggedHPYLMSet::new(profile.num_tags, profile.vocab_size + 2);
        let mut driver = TrainingDriver::new(tagged_set, FIRST_REAL_TAG, sampler);

        let t0 = Instant::now();
        driver.prepare_for_training(&raw, || false)?;
        let t_prepare = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},prepare,{},",
            profile.sentences,
            profile.vocab_size,
            profile.num_tags,
            rep,
            dur_ms(t_prepare)
        )?;

        let mut retagger = UniformRetagger::new(FIRST_REAL_TAG, profile.num_tags);
        for sweep in 0..profile.sweeps {
            let t0 = Instant::now();
            driver.perform_gibbs_sweep(&mut retagger, || false)?;
            let t_sweep = t0.elapsed();
            writeln!(
                csv,
                "{ts},{},{},{},{},sweep_{sweep},{},",
                profile.sentences,
                profile.vocab_size,
                profile.num_tags,
                rep,
                dur_ms(t_sweep)
            )?;

            let t0 = Instant::now();
            driver.sample_hyperparams();
            let t_hyper = t0.elapsed();
            writeln!(
                csv,
                "{ts},{},{},{},{},resample_hyperparams_{sweep},{},",
                profile.sentences,
                profile.vocab_size,
                profile.num_tags,
                rep,
                dur_ms(t_hyper)
            )?;
        }

        let held_out: Vec<TaggedSentence> = driver.sentences().to_vec();
        let t0 = Instant::now();
        let ppl = compute_perplexity(driver.tagged_set(), &held_out)?;
        let t_ppl = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},perplexity,{},ppl={ppl:.4}",
            profile.sentences,
            profile.vocab_size,
            profile.num_tags,
            rep,
            dur_ms(t_ppl)
        )?;
    }

    println!("Wrote report -> {}", csv_path.display());
    Ok(())
}
