//! Runtime adapters for teesink.
//!
//! Tee a process's output into a live, capacity-bounded display:
//!
//! ```text
//! writers ──▶ TextRelay ──(queue)──▶ presenter thread ──▶ Presenter
//!                 │                          │
//!                 └──── original stream ◀────┘  (on delivery failure)
//! ```
//!
//! - [`TextRelay`] - line-buffered sink, optionally taking over stdout/stderr
//! - [`StreamRedirector`] - original and redirected standard stream targets
//! - [`PresenterThread`] - owns the single-threaded presenter surface
//! - [`capture_child`] - pipes a child process's output into a relay
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod capture;
pub mod presenter;
pub mod redirect;
pub mod relay;

pub use capture::{CaptureHandles, capture_child, spawn_stream_reader};
pub use presenter::{PresenterHandle, PresenterThread, TextPresenter};
pub use redirect::{
    RedirectError, RedirectToken, RedirectedStream, RestoreOutcome, SharedWrite, StreamKind,
    StreamRedirector, StreamTarget, get_stream_redirector,
};
pub use relay::{RelayWriter, TextRelay, TextRelayBuilder};

// Test-only dependency; silence unused_crate_dependencies in unit tests
#[cfg(test)]
use tempfile as _;

// Re-export core types most callers need alongside the runtime
pub use teesink_core::{ConsoleSettings, DEFAULT_MAX_CHARS, Presenter, SharedSettings, SinkError};
