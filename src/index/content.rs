//! Content provider: discovers indexable files under a root and reads them
//! into [`Document`]s.
//!
//! Paths handed in by hosts are relative to the root and may use either
//! separator; they are normalized before they become document references.

use crate::error::{IndexError, Result};
use crate::index::types::{Document, IndexConfig};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::vec;

/// Normalize a relative path: `/` separators, no `.` segments, `..` resolved
/// lexically and never escaping the root.
pub fn normalize_rel_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            IndexError::Io(io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
}

/// Walk `root` depth-first and return the relative paths of all indexable files,
/// in traversal order.
pub fn discover(root: &Path, config: &IndexConfig) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(IndexError::read(
            root,
            io::Error::new(io::ErrorKind::NotFound, "index root is not a directory"),
        ));
    }

    let excludes = build_exclude_set(&config.exclude)?;
    let ignored_dirs = config.ignored_dirs.clone();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.depth() > 0 && entry.file_type().is_some_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy();
            !(is_dir && ignored_dirs.iter().any(|d| d.as_str() == name.as_ref()))
        })
        .build();

    let mut paths = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry during discovery");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !config.is_indexable_extension(ext) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "cannot stat file");
                continue;
            }
        };
        if size >= config.max_file_size {
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel_path = normalize_rel_path(&rel.to_string_lossy());
        if rel_path == config.snapshot_name || excludes.is_match(&rel_path) {
            continue;
        }

        paths.push(rel_path);
    }

    Ok(paths)
}

/// Read one file below `root` into a document
pub fn read_document(root: &Path, rel_path: &str) -> Result<Document> {
    let path = normalize_rel_path(rel_path);
    if path.is_empty() {
        return Err(IndexError::read(
            rel_path,
            io::Error::new(io::ErrorKind::InvalidInput, "path resolves to the index root"),
        ));
    }

    let content =
        fs::read_to_string(root.join(&path)).map_err(|e| IndexError::read(&path, e))?;

    let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();

    Ok(Document {
        path,
        filename,
        extension,
        content,
    })
}

/// A lazy, finite, single-pass sequence of documents.
///
/// Files are read only when the stream is advanced.
pub struct DocumentStream {
    root: PathBuf,
    paths: vec::IntoIter<String>,
}

impl DocumentStream {
    /// All indexable files under `root`
    pub fn discover(root: &Path, config: &IndexConfig) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            paths: discover(root, config)?.into_iter(),
        })
    }

    /// Exactly one explicitly named file
    pub fn single(root: &Path, rel_path: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            paths: vec![rel_path.to_string()].into_iter(),
        }
    }
}

impl Iterator for DocumentStream {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(read_document(&self.root, &path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for DocumentStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_normalize_rel_path() {
        assert_eq!(normalize_rel_path("./src/a.js"), "src/a.js");
        assert_eq!(normalize_rel_path("src\\lib\\b.js"), "src/lib/b.js");
        assert_eq!(normalize_rel_path("src/../lib//c.js"), "lib/c.js");
        assert_eq!(normalize_rel_path("/abs/d.js"), "abs/d.js");
        assert_eq!(normalize_rel_path("../../escape.js"), "escape.js");
        assert_eq!(normalize_rel_path("."), "");
    }

    #[test]
    fn test_discover_filters_extension_size_and_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "a.js", "let a = 1;");
        write(root, "notes.md", "# notes");
        write(root, "image.png", "not really");
        write(root, "nested/deep/b.js", "let b = 2;");
        write(root, "node_modules/pkg/index.js", "module.exports = {}");
        write(root, "big.js", &"x".repeat(600));

        let config = IndexConfig {
            max_file_size: 500,
            ..Default::default()
        };
        let mut paths = discover(root, &config).unwrap();
        paths.sort();

        assert_eq!(paths, vec!["a.js", "nested/deep/b.js", "notes.md"]);
    }

    #[test]
    fn test_discover_size_ceiling_is_exclusive() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "exact.js", &"x".repeat(100));
        write(dir.path(), "under.js", &"x".repeat(99));

        let config = IndexConfig {
            max_file_size: 100,
            ..Default::default()
        };
        assert_eq!(discover(dir.path(), &config).unwrap(), vec!["under.js"]);
    }

    #[test]
    fn test_discover_exclude_globs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/keep.js", "keep");
        write(dir.path(), "dist/bundle.js", "drop");

        let config = IndexConfig {
            exclude: vec!["dist/**".to_string()],
            ..Default::default()
        };
        assert_eq!(discover(dir.path(), &config).unwrap(), vec!["src/keep.js"]);
    }

    #[test]
    fn test_discover_skips_own_snapshot() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".treeidx.json", "{}");
        write(dir.path(), "package.json", "{}");

        assert_eq!(
            discover(dir.path(), &IndexConfig::default()).unwrap(),
            vec!["package.json"]
        );
    }

    #[test]
    fn test_discover_empty_tree() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path(), &IndexConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = discover(&dir.path().join("gone"), &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::Read { .. }));
    }

    #[test]
    fn test_read_document_splits_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/engine.js", "function search() {}");

        let doc = read_document(dir.path(), ".\\src\\engine.js").unwrap();
        assert_eq!(doc.path, "src/engine.js");
        assert_eq!(doc.filename, "engine.js");
        assert_eq!(doc.extension, "js");
        assert_eq!(doc.content, "function search() {}");
    }

    #[test]
    fn test_read_document_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_document(dir.path(), "missing.js").unwrap_err();
        assert!(matches!(err, IndexError::Read { .. }));
    }

    #[test]
    fn test_single_stream_yields_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "apple");

        let mut stream = DocumentStream::single(dir.path(), "a.txt");
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.next().unwrap().unwrap().content, "apple");
        assert!(stream.next().is_none());
    }
}
