//! Error taxonomy for the scheduler.
//!
//! None of these are fatal to a channel session: the worst outcome of any of
//! them is that nothing plays next.

use radio_types::ChannelId;

/// The queue had nothing to pop. A control signal, not a user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is empty")]
pub struct EmptyQueue;

/// A conditional queue write lost the race against another mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue slot {index} no longer holds the expected entry")]
pub struct StaleWrite {
    pub index: usize,
}

/// A queue item could not be turned into a playable source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not resolve {title:?}: {reason}")]
pub struct ResolutionFailed {
    /// Title or query of the offending item.
    pub title: String,
    pub reason: String,
}

impl ResolutionFailed {
    pub fn new(title: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            title: title.into(),
            reason: reason.to_string(),
        }
    }
}

/// Radio generation produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationFailed {
    #[error("content generator failed: {0}")]
    Generator(String),
    #[error("could not resolve radio pick {query:?}: {reason}")]
    Resolution { query: String, reason: String },
    /// The generation task ended without reporting a result.
    #[error("radio generation aborted")]
    Aborted,
}

/// Audio backend failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("audio backend offline")]
    Offline,
    #[error("cannot open {locator}: {reason}")]
    Open { locator: String, reason: String },
    #[error("playback failed to start: {0}")]
    Start(String),
    #[error("operation not supported by this backend")]
    Unsupported,
}

/// Search/URL resolution failures reported by a [`crate::SearchResolver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("no results for {0:?}")]
    NotFound(String),
    #[error("search backend error: {0}")]
    Backend(String),
}

/// Content generator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("generator reply unusable: {0}")]
    Malformed(String),
    #[error("intro synthesis failed: {0}")]
    Synthesis(String),
}

/// History store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("history store error: {0}")]
pub struct HistoryError(pub String);

/// Errors surfaced by the channel handle API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("channel {0} is not connected")]
    NotConnected(ChannelId),
    #[error("channel task has shut down")]
    ChannelClosed,
}
