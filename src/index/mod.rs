pub mod build;
pub mod content;
pub mod engine;
pub mod snapshot;
pub mod types;

pub use build::{BuildReport, build_index};
pub use content::DocumentStream;
pub use engine::SearchIndex;
pub use types::*;
