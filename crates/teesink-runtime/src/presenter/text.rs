//! In-memory text surface.

use std::ops::Range;
use teesink_core::capacity::apply_limit;
use teesink_core::ports::{Presenter, PresenterError};

/// Bounded text transcript with an optional selection.
///
/// Stands in for a text widget: it retains the most recent characters up to
/// the limit passed with each append. The selection is a range of character
/// positions and is dropped when trimming reaches into it.
#[derive(Debug, Clone, Default)]
pub struct TextPresenter {
    text: String,
    selection: Option<Range<usize>>,
    disposed: bool,
}

impl TextPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Select the characters in `range`, clamped to the retained text. An
    /// empty range clears the selection.
    pub fn select(&mut self, range: Range<usize>) {
        let len = self.char_count();
        let start = range.start.min(len);
        let end = range.end.min(len);
        self.selection = (start < end).then_some(start..end);
    }

    pub fn selection(&self) -> Option<Range<usize>> {
        self.selection.clone()
    }

    /// The selected text, if any.
    pub fn selected_text(&self) -> Option<String> {
        let range = self.selection.as_ref()?;
        Some(
            self.text
                .chars()
                .skip(range.start)
                .take(range.end - range.start)
                .collect(),
        )
    }

    /// Mark the surface as gone; later appends fail.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }
}

impl Presenter for TextPresenter {
    fn append_bounded(&mut self, text: &str, max_chars: usize) -> Result<(), PresenterError> {
        if self.disposed {
            return Err(PresenterError::Disposed);
        }

        let before = self.char_count() + text.chars().count();
        apply_limit(&mut self.text, text, max_chars);
        let trimmed = before - self.char_count();

        if trimmed > 0 {
            self.selection = self.selection.take().and_then(|range| {
                (range.start >= trimmed).then(|| range.start - trimmed..range.end - trimmed)
            });
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.text.clear();
        self.selection = None;
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn has_selection(&self) -> bool {
        self.selection.is_some()
    }
}
