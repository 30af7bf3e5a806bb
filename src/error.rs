//! Error types for the resolution engine.
//!
//! Missing optional data is never an error: absent aggregates and
//! absent codes resolve to zero.  The only failure the engine reports
//! is structurally invalid input, and it reports it for the whole run.

use thiserror::Error;

/// Result type alias using [`ResolveError`].
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that can occur while resolving an input document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A document list or record could not be interpreted.
    ///
    /// `line` is the offending line key as supplied by the caller and
    /// `index` the position of the record within that line's list, when
    /// the problem is tied to a single record.
    #[error("invalid input in {line}{}: {reason}", .index.map(|i| format!("[{i}]")).unwrap_or_default())]
    InvalidInput {
        line: String,
        index: Option<usize>,
        reason: String,
    },

    /// A product or sum left the representable range.
    #[error("arithmetic overflow computing code {code}")]
    Overflow { code: u16 },
}

impl ResolveError {
    pub(crate) fn invalid(line: &str, index: Option<usize>, reason: impl Into<String>) -> Self {
        ResolveError::InvalidInput {
            line: line.to_string(),
            index,
            reason: reason.into(),
        }
    }
}
