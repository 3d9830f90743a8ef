//! Writer-facing sink errors.
//!
//! The only failure a writer ever observes is a closed sink. Delivery,
//! capacity and redirection failures degrade gracefully and are logged
//! where they happen.

use std::io;
use thiserror::Error;

/// Error returned to callers writing into a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink has been closed (or is closing) and accepts no more input.
    #[error("Stream closed")]
    Closed,
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Closed => Self::new(io::ErrorKind::BrokenPipe, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_maps_to_broken_pipe() {
        let io_err: io::Error = SinkError::Closed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(io_err.to_string(), "Stream closed");
    }
}
