//! Per-channel playback scheduler with an autonomous radio mode.
//!
//! Each connected channel runs one task that owns its queue, now-playing
//! state and radio flags. Front-ends talk to it through [`ChannelHandle`].

pub mod audio_backend;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod handle;
pub mod models;
mod playback_engine;
pub mod prefetch;
pub mod queue_store;
pub mod radio;
pub mod registry;
pub mod session;
pub mod settings;
pub mod track_resolver;

#[cfg(test)]
mod test_support;

pub use audio_backend::{AudioBackend, Completion};
pub use collaborators::{
    Collaborators, ContentGenerator, GeneratedPick, HistoryStore, PickRequest, SearchResolver,
};
pub use error::{
    BackendError, EmptyQueue, GenerationFailed, GeneratorError, HistoryError, ResolutionFailed,
    SchedulerError, SearchError, StaleWrite,
};
pub use events::EventBus;
pub use handle::ChannelHandle;
pub use models::{AudioHandle, EntryId, Playable, PlaylistEntry, QueueItem, TrackInfo};
pub use registry::ChannelRegistry;
pub use settings::SchedulerSettings;
