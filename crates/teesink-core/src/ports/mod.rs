//! Port definitions (trait abstractions) for the relay's collaborators.
//!
//! Ports define the interfaces that the relay expects from its surroundings.
//! They contain no thread or process details.
//!
//! # Design Rules
//!
//! - The presenter is never required to be `Send`; it lives on one thread
//! - Dispatchers hand rejected work back instead of dropping it
//! - Limits are read on every delivery, never cached

pub mod dispatcher;
pub mod limit;
pub mod presenter;

pub use dispatcher::{Delivery, DeliveryDispatcher, DispatchError, DisposeHook, Fallback, Rejected};
pub use limit::{LimitError, LimitFn, LimitProvider, limit_fn};
pub use presenter::{Presenter, PresenterError};
