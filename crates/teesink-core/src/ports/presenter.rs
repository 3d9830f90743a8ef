//! Presenter port: the single-threaded display surface.

use thiserror::Error;

/// Errors a presenter may report while appending.
#[derive(Debug, Error)]
pub enum PresenterError {
    /// The underlying surface no longer exists.
    #[error("Presenter surface disposed")]
    Disposed,

    /// Any other surface failure.
    #[error("Presenter surface error: {0}")]
    Surface(String),
}

/// Display surface receiving relayed text.
///
/// All methods are called on the presenter's owning thread only, which is
/// why the trait does not require `Send` or `Sync`.
pub trait Presenter {
    /// Append `text`, trimming the oldest retained content so that at most
    /// `max_chars` characters remain.
    fn append_bounded(&mut self, text: &str, max_chars: usize) -> Result<(), PresenterError>;

    /// Remove all retained content.
    fn clear(&mut self);

    /// Whether nothing is retained.
    fn is_empty(&self) -> bool;

    /// Whether the user currently has a selection on the surface.
    fn has_selection(&self) -> bool;
}
