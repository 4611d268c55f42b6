//! Utility functions and data structures.
//!
//! ## Modules
//!
//! - [`app_data`] - Application config directory management (XDG-compliant)
//! - [`progress`] - Progress bars that compile away without the `progress` feature
//! - [`tokenizer`] - Source-code aware token extraction
//!
//! ```no_run
//! use treeidx::utils::Tokenizer;
//!
//! let tokens = Tokenizer::SOURCE_CODE.normalize("getUserById(42)");
//! // Returns: ["getuserbyid", "get", "user", "by", "id", "42"]
//! ```

pub mod app_data;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use tokenizer::*;
