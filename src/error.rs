//! Error taxonomy for the rendering core.
//!
//! Every failure here signals a broken invariant, not a recoverable
//! condition: the core never retries, logs-and-continues, or degrades.
//! Errors propagate through `reconcile`/`update` results (and through
//! pending completions for asynchronous subtrees) to the caller of
//! [`render`](crate::render).

use thiserror::Error;

/// Result alias used throughout the view layer.
pub type RenderResult<T> = Result<T, RenderError>;

/// Fatal rendering errors.
///
/// Raised synchronously and propagated as-is; asynchronous failures
/// travel through the pending completion chain unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A view was reconciled against an element whose tag differs from
    /// the tag the view was created with. The child diff replaces views
    /// on tag changes, so reaching a live view with a foreign tag means
    /// the diff invariant is broken.
    #[error("tag mismatch: view has tag <{expected}>, element has tag <{found}>")]
    TagMismatch {
        /// Tag the view was established with.
        expected: String,
        /// Tag carried by the offending element.
        found: String,
    },

    /// A component update ran with no live iterator after
    /// initialization. This includes re-entrant advancement: component
    /// code calling back into its own update while its iterator is
    /// already being advanced.
    #[error("component update with no live iterator")]
    InvalidState,
}
