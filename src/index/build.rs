use crate::error::Result;
use crate::index::content::DocumentStream;
use crate::index::engine::{PreparedDocument, SearchIndex};
use crate::index::types::IndexConfig;
use crate::utils::Tokenizer;
use crate::utils::progress::build_bar;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outcome of a full build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Files discovered under the root
    pub discovered: usize,
    /// Files that ended up in the index
    pub indexed: usize,
    /// Files that could not be read and were skipped
    pub failed: usize,
}

/// Discover and index every file under `root`.
///
/// Files are read lazily in traversal order, tokenized in parallel, and
/// inserted in traversal order so repeated builds produce identical indexes.
/// Unreadable files are logged and skipped.
pub fn build_index(
    root: &Path,
    config: &IndexConfig,
    tokenizer: Tokenizer,
    silent: bool,
) -> Result<(SearchIndex, BuildReport)> {
    let mut index = SearchIndex::new(tokenizer, config.scoring.clone());
    let stream = DocumentStream::discover(root, config)?;
    let discovered = stream.len();

    let progress = build_bar(discovered as u64, silent);
    let failed = AtomicUsize::new(0);

    let mut prepared: Vec<(usize, PreparedDocument)> = stream
        .enumerate()
        .par_bridge()
        .filter_map(|(position, doc)| {
            progress.inc(1);
            match doc {
                Ok(doc) => Some((position, index.prepare(doc))),
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "skipping file");
                    None
                }
            }
        })
        .collect();

    prepared.sort_unstable_by_key(|(position, _)| *position);

    let indexed = prepared.len();
    for (_, doc) in prepared {
        index.insert(doc);
    }

    progress.finish_with_message(format!("Indexed {} files", indexed));

    let report = BuildReport {
        discovered,
        indexed,
        failed: failed.load(Ordering::Relaxed),
    };
    tracing::info!(
        root = %root.display(),
        indexed = report.indexed,
        failed = report.failed,
        "index built"
    );

    Ok((index, report))
}
