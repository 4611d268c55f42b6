//! In-memory inverted index over the filename and content fields.
//!
//! Every field keeps `term -> {doc -> term frequency}` postings plus the token
//! count of each document, which BM25 needs for length normalization. A
//! forward map `doc -> terms` makes removal proportional to the document's own
//! vocabulary instead of the whole dictionary.

use crate::index::types::{DocRef, Document, Field, ScoringWeights, SearchHit, TermFreq};
use crate::utils::Tokenizer;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Postings for a single field
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    postings: BTreeMap<String, BTreeMap<DocRef, TermFreq>>,
    lengths: BTreeMap<DocRef, u32>,
    doc_terms: FxHashMap<DocRef, Vec<String>>,
    total_length: u64,
}

impl FieldIndex {
    /// Rebuild a field from persisted postings and lengths
    pub(crate) fn from_parts(
        postings: BTreeMap<String, BTreeMap<DocRef, TermFreq>>,
        lengths: BTreeMap<DocRef, u32>,
    ) -> Self {
        let mut doc_terms: FxHashMap<DocRef, Vec<String>> = FxHashMap::default();
        for (term, docs) in &postings {
            for doc in docs.keys() {
                doc_terms.entry(doc.clone()).or_default().push(term.clone());
            }
        }
        let total_length = lengths.values().map(|&l| l as u64).sum();

        Self {
            postings,
            lengths,
            doc_terms,
            total_length,
        }
    }

    pub(crate) fn postings(&self) -> &BTreeMap<String, BTreeMap<DocRef, TermFreq>> {
        &self.postings
    }

    pub(crate) fn lengths(&self) -> &BTreeMap<DocRef, u32> {
        &self.lengths
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    fn insert(&mut self, doc: &str, tokens: &[String]) {
        let mut counts: FxHashMap<&str, TermFreq> = FxHashMap::default();
        for token in tokens {
            *counts.entry(token.as_str()).or_default() += 1;
        }

        let mut terms = Vec::with_capacity(counts.len());
        for (term, tf) in counts {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(doc.to_string(), tf);
            terms.push(term.to_string());
        }

        self.doc_terms.insert(doc.to_string(), terms);
        self.lengths.insert(doc.to_string(), tokens.len() as u32);
        self.total_length += tokens.len() as u64;
    }

    fn remove(&mut self, doc: &str) -> bool {
        let Some(len) = self.lengths.remove(doc) else {
            return false;
        };
        self.total_length = self.total_length.saturating_sub(len as u64);

        for term in self.doc_terms.remove(doc).unwrap_or_default() {
            if let Some(docs) = self.postings.get_mut(&term) {
                docs.remove(doc);
                if docs.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        true
    }

    fn average_length(&self) -> f64 {
        if self.lengths.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.lengths.len() as f64
        }
    }
}

// The forward map is derived data; its term order depends on insertion history.
impl PartialEq for FieldIndex {
    fn eq(&self, other: &Self) -> bool {
        self.postings == other.postings && self.lengths == other.lengths
    }
}

/// A document tokenized but not yet inserted.
///
/// Preparing needs only `&SearchIndex`, so cold builds tokenize in parallel
/// and insert sequentially.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    reference: DocRef,
    tokens: [Vec<String>; 2],
}

impl PreparedDocument {
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

/// The search engine state owned by one worker
#[derive(Debug, Clone)]
pub struct SearchIndex {
    tokenizer: Tokenizer,
    weights: ScoringWeights,
    fields: [FieldIndex; 2],
}

impl SearchIndex {
    pub fn new(tokenizer: Tokenizer, weights: ScoringWeights) -> Self {
        Self {
            tokenizer,
            weights,
            fields: [FieldIndex::default(), FieldIndex::default()],
        }
    }

    pub(crate) fn from_fields(
        tokenizer: Tokenizer,
        weights: ScoringWeights,
        fields: [FieldIndex; 2],
    ) -> Self {
        Self {
            tokenizer,
            weights,
            fields,
        }
    }

    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    pub fn field(&self, field: Field) -> &FieldIndex {
        &self.fields[field.slot()]
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.field(Field::Content).lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.field(Field::Content).lengths.contains_key(reference)
    }

    /// Tokenize every field of a document
    pub fn prepare(&self, doc: Document) -> PreparedDocument {
        let tokens = Field::ALL.map(|field| self.tokenizer.normalize(doc.field(field)));
        PreparedDocument {
            reference: doc.path,
            tokens,
        }
    }

    /// Insert a prepared document, replacing any previous version of it
    pub fn insert(&mut self, prepared: PreparedDocument) {
        self.remove(&prepared.reference);
        for field in Field::ALL {
            self.fields[field.slot()].insert(&prepared.reference, &prepared.tokens[field.slot()]);
        }
    }

    /// Add or replace a document
    pub fn add(&mut self, doc: Document) {
        let prepared = self.prepare(doc);
        self.insert(prepared);
    }

    /// Remove all postings of a document. Returns false if it was not indexed.
    pub fn remove(&mut self, reference: &str) -> bool {
        let mut removed = false;
        for field in &mut self.fields {
            removed |= field.remove(reference);
        }
        removed
    }

    /// Ranked free-text search.
    ///
    /// Query terms are OR-ed; each field contributes a BM25 score multiplied by
    /// its boost. Results are ordered by descending score, then by reference.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let mut seen = FxHashSet::default();
        let terms: Vec<String> = self
            .tokenizer
            .query_terms(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        if terms.is_empty() || self.is_empty() {
            return Vec::new();
        }

        let doc_count = self.len() as f64;
        let ScoringWeights { k1, b, .. } = self.weights;
        let mut scores: FxHashMap<&str, f64> = FxHashMap::default();

        for field in Field::ALL {
            let boost = self.weights.boost(field);
            if boost <= 0.0 {
                continue;
            }

            let index = self.field(field);
            let avg_len = index.average_length();

            for term in &terms {
                let Some(docs) = index.postings.get(term) else {
                    continue;
                };

                let df = docs.len() as f64;
                let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln();

                for (doc, &tf) in docs {
                    let len = index.lengths.get(doc).copied().unwrap_or(0) as f64;
                    let norm = if avg_len > 0.0 {
                        1.0 - b + b * len / avg_len
                    } else {
                        1.0
                    };
                    let tf = tf as f64;
                    let score = idf * tf * (k1 + 1.0) / (tf + k1 * norm);
                    *scores.entry(doc.as_str()).or_default() += boost * score;
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(doc, score)| SearchHit {
                reference: doc.to_string(),
                score,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, content: &str) -> Document {
        let filename = path.rsplit('/').next().unwrap().to_string();
        let extension = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("").to_string();
        Document {
            path: path.to_string(),
            filename,
            extension,
            content: content.to_string(),
        }
    }

    fn index() -> SearchIndex {
        SearchIndex::new(Tokenizer::SOURCE_CODE, ScoringWeights::default())
    }

    fn refs(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.reference.as_str()).collect()
    }

    #[test]
    fn test_basic_search() {
        let mut idx = index();
        idx.add(doc("a.txt", "apple banana"));
        idx.add(doc("b.txt", "banana cherry"));

        let hits = idx.search("banana");
        let mut banana = refs(&hits);
        banana.sort();
        assert_eq!(banana, vec!["a.txt", "b.txt"]);
        assert_eq!(refs(&idx.search("apple")), vec!["a.txt"]);
        assert!(idx.search("").is_empty());
        assert!(idx.search("durian").is_empty());
    }

    #[test]
    fn test_empty_index_search() {
        assert!(index().search("anything").is_empty());
    }

    #[test]
    fn test_add_then_remove() {
        let mut idx = index();
        idx.add(doc("a.js", "uniqueToken shared"));
        idx.add(doc("b.js", "shared"));

        assert!(idx.remove("a.js"));
        assert!(idx.search("uniquetoken").is_empty());
        assert_eq!(refs(&idx.search("shared")), vec!["b.js"]);
        assert_eq!(idx.len(), 1);
        assert!(!idx.contains("a.js"));
        assert!(idx.field(Field::Content).postings().get("uniquetoken").is_none());
    }

    #[test]
    fn test_readd_replaces_postings() {
        let mut idx = index();
        idx.add(doc("a.js", "oldword common"));
        idx.add(doc("a.js", "newword common"));

        assert!(idx.search("oldword").is_empty());
        assert_eq!(refs(&idx.search("newword")), vec!["a.js"]);
        assert_eq!(idx.len(), 1);
        assert_eq!(
            idx.field(Field::Content).postings()["common"]["a.js"],
            1,
            "term frequency must not accumulate across re-adds"
        );
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut idx = index();
        idx.add(doc("a.js", "alpha"));
        let before = idx.search("alpha");

        assert!(!idx.remove("missing.js"));
        assert_eq!(idx.search("alpha"), before);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn test_filename_hits_rank_first() {
        let mut idx = index();
        idx.add(doc("lib/search.js", "function run() {}"));
        idx.add(doc("lib/other.js", "search search"));

        let hits = idx.search("search");
        assert_eq!(refs(&hits), vec!["lib/search.js", "lib/other.js"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_ties_break_by_reference() {
        let mut idx = index();
        idx.add(doc("z.md", "same words"));
        idx.add(doc("a.md", "same words"));
        idx.add(doc("m.md", "same words"));

        let hits = idx.search("same");
        assert_eq!(refs(&hits), vec!["a.md", "m.md", "z.md"]);
    }

    #[test]
    fn test_more_matching_terms_score_higher() {
        let mut idx = index();
        idx.add(doc("one.js", "parse tokens here"));
        idx.add(doc("two.js", "parse only"));

        let hits = idx.search("parse tokens");
        assert_eq!(hits[0].reference, "one.js");
    }

    #[test]
    fn test_long_run_only_searchable_by_parts() {
        let mut idx = index();
        idx.add(doc("a.js", "const parse_request_headers_into_struct_fields = 1;"));

        assert!(idx.search("parse_request_headers_into_struct_fields").is_empty());
        assert_eq!(refs(&idx.search("headers")), vec!["a.js"]);
    }

    #[test]
    fn test_prepare_then_insert_matches_add() {
        let mut a = index();
        let mut b = index();
        a.add(doc("x.js", "let value = compute()"));
        let prepared = b.prepare(doc("x.js", "let value = compute()"));
        assert_eq!(prepared.reference(), "x.js");
        b.insert(prepared);

        assert_eq!(a.field(Field::Content), b.field(Field::Content));
        assert_eq!(a.field(Field::Filename), b.field(Field::Filename));
    }
}
