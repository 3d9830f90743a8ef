//! Console settings types and validation.
//!
//! These are pure domain types; loading them from disk or an environment is
//! up to the embedding application.

use crate::capacity::DEFAULT_MAX_CHARS;
use crate::ports::{LimitError, LimitProvider};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Console settings.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Maximum number of characters the presenter retains.
    pub max_chars: Option<u32>,

    /// Whether a relay built from these settings takes over the process
    /// standard streams.
    pub redirect_streams: Option<bool>,
}

impl ConsoleSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            max_chars: Some(DEFAULT_MAX_CHARS as u32),
            redirect_streams: Some(false),
        }
    }

    /// Get the effective capacity (with default fallback).
    #[must_use]
    pub fn effective_max_chars(&self) -> usize {
        match self.max_chars {
            Some(0) | None => DEFAULT_MAX_CHARS,
            Some(max) => usize::try_from(max).unwrap_or(usize::MAX),
        }
    }

    /// Get the effective redirect flag (defaults to `false`).
    #[must_use]
    pub fn effective_redirect_streams(&self) -> bool {
        self.redirect_streams.unwrap_or(false)
    }

    /// Merge an update into this one, only touching fields that are Some.
    pub fn merge(&mut self, other: &ConsoleSettingsUpdate) {
        if let Some(max_chars) = other.max_chars {
            self.max_chars = max_chars;
        }
        if let Some(redirect) = other.redirect_streams {
            self.redirect_streams = redirect;
        }
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = reset field to its default
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleSettingsUpdate {
    pub max_chars: Option<Option<u32>>,
    pub redirect_streams: Option<Option<bool>>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Console capacity must be a positive number of characters, got {0}")]
    InvalidMaxChars(u32),
}

/// Validate settings values.
pub fn validate_settings(settings: &ConsoleSettings) -> Result<(), SettingsError> {
    if settings.max_chars == Some(0) {
        return Err(SettingsError::InvalidMaxChars(0));
    }

    Ok(())
}

/// Settings shared between the configuring side and running relays.
///
/// Implements [`LimitProvider`] by reading the current `max_chars` on every
/// call, so updates are picked up by the next delivery.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<ConsoleSettings>>,
}

impl SharedSettings {
    pub fn new(settings: ConsoleSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> ConsoleSettings {
        match self.inner.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a partial update. The update is rejected as a whole if the
    /// merged result does not validate.
    pub fn update(&self, update: &ConsoleSettingsUpdate) -> Result<ConsoleSettings, SettingsError> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut merged = guard.clone();
        merged.merge(update);
        validate_settings(&merged)?;
        *guard = merged.clone();
        Ok(merged)
    }
}

impl LimitProvider for SharedSettings {
    fn max_chars(&self) -> Result<Option<usize>, LimitError> {
        let settings = self
            .inner
            .read()
            .map_err(|_| LimitError::Unavailable("console settings lock poisoned".into()))?;
        Ok(settings
            .max_chars
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX)))
    }
}
