//! Presenter side of the relay.
//!
//! - `PresenterThread` / `PresenterHandle` - the single-threaded surface owner
//!   and its cross-thread job queue
//! - `TextPresenter` - an in-memory bounded text surface

mod text;
mod thread;

pub use text::TextPresenter;
pub use thread::{PresenterHandle, PresenterThread};
