//! Audio backend abstraction for one channel's output.
//!
//! Implementations own the actual audio output and report completion from a
//! thread of their choosing.

use crate::error::BackendError;
use crate::models::AudioHandle;

/// Continuation fired once when a started source ends, is stopped, or fails mid-stream.
///
/// Runs on the backend's own thread. It must only hand off, never touch session state.
pub type Completion = Box<dyn FnOnce(Option<BackendError>) + Send + 'static>;

pub trait AudioBackend: Send + Sync {
    /// Open a stream URL or file path.
    fn open(&self, locator: &str) -> Result<AudioHandle, BackendError>;

    /// Start playing `handle`, replacing whatever is playing.
    ///
    /// When this returns `Err`, `on_complete` is dropped without being called.
    fn play(&self, handle: AudioHandle, on_complete: Completion) -> Result<(), BackendError>;

    /// Stop the current source. Its completion still fires.
    fn stop(&self) -> Result<(), BackendError>;

    fn pause_toggle(&self) -> Result<(), BackendError>;

    fn is_playing(&self) -> bool;
}
