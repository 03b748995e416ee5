//! Command-line interface for training and querying HPYLM part-of-speech
//! tagged language models.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hpylm_core::Sampler;
use hpylm_corpus::{load_corpus, Dictionary};
use hpylm_tagger::{compute_perplexity, TaggedHPYLMSet, TaggedSentence, TrainingDriver, UniformRetagger};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// First tag id past the two reserved boundary tags (`BOS_POS`, `EOS_POS`).
const FIRST_REAL_TAG: u32 = 2;

#[derive(Parser)]
#[command(name = "hpylm-cli", about = "Train and query a Hierarchical Pitman-Yor POS-tagged language model")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load a corpus, prepare random tags, run Gibbs sweeps, and save the model.
    Train {
        /// Path to a text corpus: one sentence per line, whitespace-tokenized.
        #[arg(long)]
        corpus: PathBuf,
        /// Directory to write the trained model and dictionary into.
        #[arg(long)]
        out_dir: PathBuf,
        /// Number of part-of-speech tags, including the two reserved boundary tags.
        #[arg(long, default_value_t = 12)]
        num_tags: usize,
        /// Number of Gibbs sweeps to run after initialization.
        #[arg(long, default_value_t = 5)]
        sweeps: usize,
        /// Fraction of sentences held out for perplexity evaluation.
        #[arg(long, default_value_t = 0.1)]
        split_probability: f64,
        /// RNG seed, for reproducible runs.
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Evaluate perplexity of an already-trained model against held-out text.
    Perplexity {
        /// Directory previously written by `train`.
        #[arg(long)]
        model_dir: PathBuf,
        /// Held-out corpus: one sentence per line.
        #[arg(long)]
        corpus: PathBuf,
        /// RNG seed used to assign held-out tags before scoring.
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Print the most frequent words directly seated under one tag.
    Dump {
        /// Directory previously written by `train`.
        #[arg(long)]
        model_dir: PathBuf,
        /// Tag id to inspect.
        #[arg(long)]
        tag: u32,
        /// Maximum number of words to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Train { corpus, out_dir, num_tags, sweeps, split_probability, seed } => {
            train(&corpus, &out_dir, num_tags, sweeps, split_probability, seed)
        }
        Cmd::Perplexity { model_dir, corpus, seed } => perplexity(&model_dir, &corpus, seed),
        Cmd::Dump { model_dir, tag, limit } => dump(&model_dir, tag, limit),
    }
}

fn train(
    corpus_path: &std::path::Path,
    out_dir: &std::path::Path,
    num_tags: usize,
    sweeps: usize,
    split_probability: f64,
    seed: u64,
) -> Result<()> {
    let mut dictionary = Dictionary::new();
    let mut sampler = Sampler::seeded(seed);

    let file = File::open(corpus_path).with_context(|| format!("opening corpus {}", corpus_path.display()))?;
    let split = load_corpus(BufReader::new(file), &mut dictionary, split_probability, &mut sampler)
        .context("loading corpus")?;
    info!(train = split.train.len(), held_out = split.held_out.len(), "loaded corpus");

    let tagged_set = TaggedHPYLMSet::new(num_tags, dictionary.len());
    let mut driver = TrainingDriver::new(tagged_set, FIRST_REAL_TAG, sampler);

    driver.prepare_for_training(&split.train, || false).context("preparing initial tags")?;

    let mut retagger = UniformRetagger::new(FIRST_REAL_TAG, num_tags);
    for sweep in 0..sweeps {
        driver.perform_gibbs_sweep(&mut retagger, || false).with_context(|| format!("gibbs sweep {sweep}"))?;
        driver.sample_hyperparams();
        info!(sweep, "completed gibbs sweep");
    }

    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    driver.tagged_set().save_to_dir(&out_dir.join("model")).context("saving model")?;
    let dict_file = File::create(out_dir.join("dictionary.json")).context("creating dictionary.json")?;
    serde_json::to_writer_pretty(dict_file, &dictionary).context("writing dictionary")?;

    info!(out_dir = %out_dir.display(), "training complete");
    Ok(())
}

fn perplexity(model_dir: &std::path::Path, corpus_path: &std::path::Path, seed: u64) -> Result<()> {
    let tagged_set = TaggedHPYLMSet::load_from_dir(&model_dir.join("model")).context("loading model")?;
    let mut dictionary = load_dictionary(model_dir)?;
    let mut sampler = Sampler::seeded(seed);

    let file = File::open(corpus_path).with_context(|| format!("opening corpus {}", corpus_path.display()))?;
    let split = load_corpus(BufReader::new(file), &mut dictionary, 1.0, &mut sampler).context("loading corpus")?;

    // Held-out words are scored under one fixed tag rather than a resampled
    // one: the word_hpylm they land in should not depend on the seed.
    let held_out: Vec<TaggedSentence> = split
        .held_out
        .iter()
        .map(|sentence| TaggedSentence::with_uniform_interior_tag(sentence.word_ids.clone(), FIRST_REAL_TAG))
        .collect();

    let ppl = compute_perplexity(&tagged_set, &held_out).context("computing perplexity")?;
    println!("perplexity: {ppl:.4}");
    Ok(())
}

fn dump(model_dir: &std::path::Path, tag: u32, limit: usize) -> Result<()> {
    let tagged_set = TaggedHPYLMSet::load_from_dir(&model_dir.join("model")).context("loading model")?;
    let dictionary = load_dictionary(model_dir)?;
    let top = tagged_set.top_words_for_tag(tag, limit).context("looking up tag")?;
    for (word_id, count) in top {
        let word = dictionary.word_of(word_id).unwrap_or("<unknown>");
        println!("{word}\t{count}");
    }
    Ok(())
}

fn load_dictionary(model_dir: &std::path::Path) -> Result<Dictionary> {
    let file = File::open(model_dir.join("dictionary.json")).context("opening dictionary.json")?;
    serde_json::from_reader(BufReader::new(file)).context("parsing dictionary.json")
}
