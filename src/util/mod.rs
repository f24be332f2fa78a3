//! Utility functions for common operations.
//!
//! Unicode-aware width calculation and truncation, plus sanitising of
//! untrusted document text before it reaches the terminal.
//!
//! ```
//! use blogfeed::util::sanitize_line;
//!
//! assert_eq!(sanitize_line("\x1b[31mRed\x1b[0m title", 20), "Red title");
//! ```

mod text;

pub use text::sanitize_line;

/// Maximum allowed search term length, checked before any store query
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
