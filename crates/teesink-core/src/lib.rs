//! Core domain types and port definitions for teesink.
//!
//! This crate holds everything about the capture → buffer → deliver pipeline
//! that does not need threads or process handles:
//!
//! - [`LineBuffer`] - accumulates bytes until a line terminator is seen
//! - [`capacity`] - head-truncation of the presenter's retained text
//! - [`settings`] - console settings and the shared, re-read limit provider
//! - [`ports`] - the `Presenter`, `DeliveryDispatcher` and `LimitProvider` seams
//!
//! Runtime adapters (presenter thread, relay, stream redirection) live in
//! `teesink-runtime`.
#![deny(unused_crate_dependencies)]

pub mod capacity;
pub mod error;
pub mod line_buffer;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use capacity::{DEFAULT_MAX_CHARS, apply_limit, resolve_max_chars};
pub use error::SinkError;
pub use line_buffer::{LINE_SEPARATOR, LineBuffer};
pub use ports::{
    Delivery, DeliveryDispatcher, DispatchError, DisposeHook, Fallback, LimitError, LimitProvider,
    Presenter, PresenterError, Rejected, limit_fn,
};
pub use settings::{
    ConsoleSettings, ConsoleSettingsUpdate, SettingsError, SharedSettings, validate_settings,
};

#[cfg(test)]
use serde_json as _;
