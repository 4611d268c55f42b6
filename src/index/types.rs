use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a document: its slash-normalized path relative to the root
pub type DocRef = String;

/// Term frequency of a term within one document field
pub type TermFreq = u32;

/// The two indexed fields of every document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Filename,
    Content,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Filename, Field::Content];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Filename => "filename",
            Field::Content => "content",
        }
    }

    /// Position of the field in per-field arrays
    pub fn slot(&self) -> usize {
        match self {
            Field::Filename => 0,
            Field::Content => 1,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file prepared for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Relative, slash-separated path; the document's identity
    pub path: DocRef,
    /// Final path component, e.g. `engine.js`
    pub filename: String,
    /// Extension without the dot, empty if none
    pub extension: String,
    pub content: String,
}

impl Document {
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Filename => &self.filename,
            Field::Content => &self.content,
        }
    }
}

/// Search match result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "ref")]
    pub reference: DocRef,
    pub score: f64,
}

/// Per-field weights and BM25 parameters used for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Multiplier applied to filename-field scores
    pub filename_boost: f64,
    /// Multiplier applied to content-field scores
    pub content_boost: f64,
    /// Term frequency saturation
    pub k1: f64,
    /// Field length normalization (0 = none, 1 = full)
    pub b: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            filename_boost: 3.0,
            content_boost: 1.0,
            k1: 1.2,
            b: 0.75,
        }
    }
}

impl ScoringWeights {
    pub fn boost(&self, field: Field) -> f64 {
        match field {
            Field::Filename => self.filename_boost,
            Field::Content => self.content_boost,
        }
    }
}

/// Configuration for one indexed root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Files of this size or larger are skipped during discovery
    pub max_file_size: u64,
    /// Indexable extensions, without the dot
    pub extensions: Vec<String>,
    /// Directory names never descended into
    pub ignored_dirs: Vec<String>,
    /// Glob patterns (relative to the root) excluded from discovery
    pub exclude: Vec<String>,
    /// Registered tokenizer name
    pub tokenizer: String,
    /// Snapshot file name, created at the indexed root
    pub snapshot_name: String,
    /// Scoring weights for search result ranking
    pub scoring: ScoringWeights,
    /// Number of cached query results per worker (0 disables the cache)
    pub query_cache_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: 500_000,
            extensions: ["js", "mjs", "cjs", "ts", "jsx", "tsx", "html", "css", "md", "json"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            ignored_dirs: vec![".git".to_string(), "node_modules".to_string()],
            exclude: Vec::new(),
            tokenizer: "source-code".to_string(),
            snapshot_name: ".treeidx.json".to_string(),
            scoring: ScoringWeights::default(),
            query_cache_size: 128,
        }
    }
}

impl IndexConfig {
    pub fn is_indexable_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}
