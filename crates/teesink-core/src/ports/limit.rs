//! Limit provider port.
//!
//! The presenter capacity may change while the relay is running, so it is
//! exposed as a capability queried on every delivery.

use thiserror::Error;

/// Errors a limit provider may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// The configured value could not be read.
    #[error("Limit unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current maximum character count.
pub trait LimitProvider: Send + Sync {
    /// The configured limit, `None` when unset.
    fn max_chars(&self) -> Result<Option<usize>, LimitError>;
}

impl LimitProvider for usize {
    fn max_chars(&self) -> Result<Option<usize>, LimitError> {
        Ok(Some(*self))
    }
}

impl LimitProvider for Option<usize> {
    fn max_chars(&self) -> Result<Option<usize>, LimitError> {
        Ok(*self)
    }
}

/// Limit provider backed by a closure.
pub struct LimitFn<F>(F);

/// Wrap a closure as a [`LimitProvider`].
pub const fn limit_fn<F>(f: F) -> LimitFn<F>
where
    F: Fn() -> Result<Option<usize>, LimitError> + Send + Sync,
{
    LimitFn(f)
}

impl<F> LimitProvider for LimitFn<F>
where
    F: Fn() -> Result<Option<usize>, LimitError> + Send + Sync,
{
    fn max_chars(&self) -> Result<Option<usize>, LimitError> {
        (self.0)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_read_on_every_call() {
        let current = Arc::new(AtomicUsize::new(10));
        let source = Arc::clone(&current);
        let provider = limit_fn(move || Ok(Some(source.load(Ordering::SeqCst))));

        assert_eq!(provider.max_chars(), Ok(Some(10)));
        current.store(20, Ordering::SeqCst);
        assert_eq!(provider.max_chars(), Ok(Some(20)));
    }

    #[test]
    fn test_optional_limit() {
        assert_eq!(None::<usize>.max_chars(), Ok(None));
        assert_eq!(Some(5usize).max_chars(), Ok(Some(5)));
    }
}
