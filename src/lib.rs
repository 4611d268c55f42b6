//! # treeidx - Embedded full-text search for project trees
//!
//! treeidx keeps a ranked full-text index over the files of one directory
//! tree. The index lives inside a worker that a host talks to through
//! messages, so indexing never blocks the host.
//!
//! ## Architecture
//!
//! - [`index`] - Content discovery, tokenizing, the BM25 engine and snapshots
//! - [`server`] - Worker message protocol, worker loop and host-side handles
//! - [`output`] - Terminal formatting for hits and status
//! - [`utils`] - Tokenizers, configuration and progress reporting
//!
//! ## Quick Start
//!
//! ```ignore
//! use treeidx::server::IndexHost;
//! use treeidx::utils::AppConfig;
//! use std::path::Path;
//!
//! let host = IndexHost::new(AppConfig::load()?);
//! host.create_index(Path::new("/path/to/project"))?;
//!
//! // later, once get_status reports Available
//! for hit in host.search(Path::new("/path/to/project"), "parse tokens")? {
//!     println!("{} {:.3}", hit.reference, hit.score);
//! }
//! ```
//!
//! ## Persistence
//!
//! Every mutation rewrites the snapshot (`.treeidx.json` at the root) in one
//! atomic rename. A missing, corrupt or foreign snapshot is replaced by a
//! full rebuild on the next `init`.

pub mod error;
pub mod index;
pub mod output;
pub mod server;
pub mod utils;

pub use error::{IndexError, Result};
