//! Serialization of an [`crate::HPYLM`] to JSON or CBOR, with
//! extension-based format auto-detection — mirrors the dual-format
//! read/write helpers the rest of the workspace uses for its own
//! artifacts.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::TokenId;

/// Current on-disk schema version. Bump when the shape of
/// [`HpylmSnapshot`] changes in a way older readers can't tolerate.
pub const FORMAT_VERSION: u16 = 1;

/// Depth-first serializable snapshot of one restaurant subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// dish -> per-table customer counts.
    pub arrangement: Vec<(TokenId, Vec<u32>)>,
    /// context token id -> child subtree.
    pub children: Vec<(TokenId, NodeSnapshot)>,
}

/// Serializable snapshot of an entire [`crate::HPYLM`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpylmSnapshot {
    /// Schema version this snapshot was written with.
    pub format_version: u16,
    /// Fixed context depth (ngram order minus one).
    pub depth: usize,
    /// Base distribution probability.
    pub g0: f64,
    /// Per-depth discounts.
    pub d_m: Vec<f64>,
    /// Per-depth concentrations.
    pub theta_m: Vec<f64>,
    /// Per-depth discount hyperprior `a`.
    pub a_m: Vec<f64>,
    /// Per-depth discount hyperprior `b`.
    pub b_m: Vec<f64>,
    /// Per-depth concentration hyperprior `alpha`.
    pub alpha_m: Vec<f64>,
    /// Per-depth concentration hyperprior `beta`.
    pub beta_m: Vec<f64>,
    /// Root restaurant subtree.
    pub root: NodeSnapshot,
}

fn ext_lower(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase()
}

/// Write a snapshot to `path`, choosing JSON or CBOR by file extension
/// (`.json` -> pretty JSON; anything else, including `.cbor`, -> CBOR).
pub fn write_snapshot(path: &Path, snapshot: &HpylmSnapshot) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::DeserializationError(format!("creating {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    if ext_lower(path) == "json" {
        serde_json::to_writer_pretty(&mut writer, snapshot)
            .map_err(|e| Error::DeserializationError(format!("writing json: {e}")))?;
    } else {
        ciborium::into_writer(snapshot, &mut writer)
            .map_err(|e| Error::DeserializationError(format!("writing cbor: {e}")))?;
    }
    Ok(())
}

/// Read a snapshot from `path`, choosing JSON or CBOR by file extension.
pub fn read_snapshot(path: &Path) -> Result<HpylmSnapshot> {
    let file = File::open(path)
        .map_err(|e| Error::DeserializationError(format!("opening {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let snapshot: HpylmSnapshot = if ext_lower(path) == "json" {
        serde_json::from_reader(&mut reader)
            .map_err(|e| Error::DeserializationError(format!("parsing json: {e}")))?
    } else {
        ciborium::from_reader(&mut reader)
            .map_err(|e| Error::DeserializationError(format!("parsing cbor: {e}")))?
    };
    if snapshot.format_version > FORMAT_VERSION {
        return Err(Error::DeserializationError(format!(
            "snapshot format_version {} is newer than supported {FORMAT_VERSION}",
            snapshot.format_version
        )));
    }
    Ok(snapshot)
}
