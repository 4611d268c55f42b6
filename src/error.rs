//! Error types for index operations.
//!
//! [`IndexError`] covers everything the engine, the content provider, the
//! snapshot layer and the worker protocol can fail with. The worker decides
//! per variant whether an error is swallowed (bulk discovery), turned into a
//! rebuild (snapshot load) or surfaced as an `error` reply.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// A message on the channel could not be decoded
    #[error("Malformed message: {0}")]
    Channel(String),

    /// A file could not be read during discovery or a targeted add
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The persisted snapshot could not be parsed
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The snapshot names a tokenizer this build does not provide
    #[error("Snapshot was built with tokenizer `{found}`, expected `{expected}`")]
    TokenizerMismatch { found: String, expected: String },

    /// Configuration names a tokenizer that is not registered
    #[error("Unknown tokenizer `{0}`")]
    UnknownTokenizer(String),

    /// The engine has not reached the ready state
    #[error("Index is not ready")]
    NotReady,

    /// Snapshot write or other filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(msg: impl std::fmt::Display) -> Self {
        IndexError::CorruptSnapshot(msg.to_string())
    }

    /// Snapshot errors mean "no usable snapshot" and trigger a rebuild.
    pub fn is_unusable_snapshot(&self) -> bool {
        matches!(
            self,
            IndexError::CorruptSnapshot(_)
                | IndexError::TokenizerMismatch { .. }
                | IndexError::Read { .. }
        )
    }
}
