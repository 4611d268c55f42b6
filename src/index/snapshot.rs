//! Snapshot persistence.
//!
//! The whole engine state is written as one JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "tokenizer": "source-code",
//!   "ref": "path",
//!   "fields": [
//!     { "name": "filename", "postings": { term: { doc: tf } }, "lengths": { doc: n } },
//!     { "name": "content",  ... }
//!   ]
//! }
//! ```
//!
//! Writes go to a temporary file in the same directory which then replaces the
//! snapshot, so readers never observe a partially written file.

use crate::error::{IndexError, Result};
use crate::index::engine::{FieldIndex, SearchIndex};
use crate::index::types::{DocRef, Field, IndexConfig, ScoringWeights, TermFreq};
use crate::utils::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Name of the document reference key, recorded for readers of the file
const REF_FIELD: &str = "path";

type Postings = BTreeMap<String, BTreeMap<DocRef, TermFreq>>;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    tokenizer: &'a str,
    #[serde(rename = "ref")]
    reference: &'a str,
    fields: Vec<FieldOut<'a>>,
}

#[derive(Serialize)]
struct FieldOut<'a> {
    name: Field,
    postings: &'a Postings,
    lengths: &'a BTreeMap<DocRef, u32>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    tokenizer: String,
    #[serde(rename = "ref")]
    reference: String,
    fields: Vec<FieldIn>,
}

#[derive(Deserialize)]
struct FieldIn {
    name: Field,
    postings: Postings,
    lengths: BTreeMap<DocRef, u32>,
}

/// Location of the snapshot for a root
pub fn snapshot_path(root: &Path, config: &IndexConfig) -> PathBuf {
    root.join(&config.snapshot_name)
}

/// Serialize the engine state
pub fn to_bytes(index: &SearchIndex) -> Result<Vec<u8>> {
    let snapshot = SnapshotOut {
        version: SNAPSHOT_VERSION,
        tokenizer: index.tokenizer().name(),
        reference: REF_FIELD,
        fields: Field::ALL
            .iter()
            .map(|&field| FieldOut {
                name: field,
                postings: index.field(field).postings(),
                lengths: index.field(field).lengths(),
            })
            .collect(),
    };

    serde_json::to_vec(&snapshot).map_err(|e| IndexError::Io(e.into()))
}

/// Restore engine state.
///
/// `expected` is the tokenizer the caller wants to search with; a snapshot
/// written by any other tokenizer is rejected rather than reinterpreted.
pub fn from_bytes(bytes: &[u8], expected: Tokenizer, weights: ScoringWeights) -> Result<SearchIndex> {
    let snapshot: SnapshotIn = serde_json::from_slice(bytes).map_err(IndexError::corrupt)?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(IndexError::corrupt(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    if snapshot.reference != REF_FIELD {
        return Err(IndexError::corrupt(format!(
            "unexpected reference field `{}`",
            snapshot.reference
        )));
    }

    let tokenizer = Tokenizer::by_name(&snapshot.tokenizer)
        .filter(|t| *t == expected)
        .ok_or_else(|| IndexError::TokenizerMismatch {
            found: snapshot.tokenizer.clone(),
            expected: expected.name().to_string(),
        })?;

    let mut slots: [Option<FieldIndex>; 2] = [None, None];
    for field in snapshot.fields {
        for doc in field.postings.values().flat_map(|docs| docs.keys()) {
            if !field.lengths.contains_key(doc) {
                return Err(IndexError::corrupt(format!(
                    "field `{}` has postings for unknown document `{}`",
                    field.name, doc
                )));
            }
        }

        let slot = &mut slots[field.name.slot()];
        if slot.is_some() {
            return Err(IndexError::corrupt(format!("duplicate field `{}`", field.name)));
        }
        *slot = Some(FieldIndex::from_parts(field.postings, field.lengths));
    }

    let [Some(filename), Some(content)] = slots else {
        return Err(IndexError::corrupt("snapshot is missing a field"));
    };

    if !filename.lengths().keys().eq(content.lengths().keys()) {
        return Err(IndexError::corrupt("fields disagree on the document set"));
    }

    Ok(SearchIndex::from_fields(tokenizer, weights, [filename, content]))
}

/// Write the snapshot, replacing any previous one in a single rename
pub fn save(index: &SearchIndex, path: &Path) -> Result<()> {
    let bytes = to_bytes(index)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), docs = index.len(), "snapshot written");
    Ok(())
}

/// Read and restore a snapshot file
pub fn load(path: &Path, expected: Tokenizer, weights: ScoringWeights) -> Result<SearchIndex> {
    let bytes = fs::read(path).map_err(|e| IndexError::read(path, e))?;
    from_bytes(&bytes, expected, weights)
}
