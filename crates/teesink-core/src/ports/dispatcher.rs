//! Delivery dispatcher port.
//!
//! A dispatcher moves finished text from a writer onto the presenter's
//! thread. Dispatch never blocks the writer and never runs the presenter
//! inline.

use std::fmt;
use thiserror::Error;

/// Best-effort writer used when a delivery cannot reach the presenter.
///
/// Must not panic or report errors; a broken fallback stream is accepted as
/// unrecoverable.
pub type Fallback = Box<dyn FnOnce(&str) + Send>;

/// Hook run once when the presenter surface is disposed.
pub type DisposeHook = Box<dyn FnOnce() + Send>;

/// Reasons a dispatcher refuses work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The presenter thread has shut down.
    #[error("Presenter disposed")]
    Disposed,

    /// A blocking call was made from the presenter thread itself.
    #[error("Cannot wait on the presenter thread from itself")]
    SameThread,
}

/// A unit of text bound for the presenter.
pub struct Delivery {
    /// Text to append, byte-for-byte what the writer produced.
    pub text: String,
    /// Capacity resolved for this delivery.
    pub max_chars: usize,
    /// Invoked with `text` if the presenter fails to append it.
    pub fallback: Fallback,
}

impl Delivery {
    pub fn new(text: String, max_chars: usize, fallback: Fallback) -> Self {
        Self {
            text,
            max_chars,
            fallback,
        }
    }

    /// Route the text to the fallback writer, consuming the delivery.
    pub fn fall_back(self) {
        (self.fallback)(&self.text);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("text", &self.text)
            .field("max_chars", &self.max_chars)
            .finish_non_exhaustive()
    }
}

/// A delivery the dispatcher could not schedule, handed back to the caller.
#[derive(Debug)]
pub struct Rejected {
    pub delivery: Delivery,
    pub reason: DispatchError,
}

/// Port for scheduling deliveries onto the presenter's thread.
///
/// Implementations must not emit log events from `dispatch`: callers may be
/// holding the relay's buffer lock, and the log writer may route back into
/// the same relay.
pub trait DeliveryDispatcher: Send + Sync {
    /// Queue a delivery. Returns it unchanged if it cannot be scheduled.
    fn dispatch(&self, delivery: Delivery) -> Result<(), Rejected>;

    /// Register a hook to run when the presenter is disposed. If it is
    /// already disposed the hook runs immediately on the calling thread.
    fn on_dispose(&self, hook: DisposeHook);
}
