//! Contracts for the services the scheduler calls but does not own.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use radio_types::ChannelId;

use crate::error::{GeneratorError, HistoryError, SearchError};
use crate::models::{PlaylistEntry, TrackInfo};

/// Turns free text or URLs into playable descriptors.
#[async_trait]
pub trait SearchResolver: Send + Sync {
    /// Resolve a query or URL to its first playable result.
    async fn resolve(&self, query: &str) -> Result<TrackInfo, SearchError>;

    /// Expand a playlist URL into its entries.
    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistEntry>, SearchError>;
}

/// Context handed to the content generator for one radio pick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PickRequest {
    /// Most recent titles, newest first. Used to detect the vibe.
    pub recent: Vec<String>,
    /// Titles that must not be picked again.
    pub avoid: Vec<String>,
    /// Artist or genre every pick must stay within.
    pub mood: Option<String>,
    /// First pick since the radio was switched on.
    pub session_start: bool,
    /// Whether intro audio should be synthesized.
    pub speak_intro: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedPick {
    /// Search query for the song, usually `Artist - Title`.
    pub song_query: String,
    /// Short spoken introduction.
    pub intro_text: String,
    /// Synthesized intro, owned by the scheduler from here on.
    pub intro_audio: Option<PathBuf>,
}

/// Picks songs and writes their introductions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn next_pick(&self, request: PickRequest) -> Result<GeneratedPick, GeneratorError>;
}

/// Persistent per-channel play history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Titles played on `channel`, newest first.
    async fn recent(&self, channel: &ChannelId, limit: usize) -> Result<Vec<String>, HistoryError>;

    async fn log_play(
        &self,
        channel: &ChannelId,
        requester: Option<&str>,
        title: &str,
    ) -> Result<(), HistoryError>;
}

/// Shared collaborator set used by every channel.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchResolver>,
    pub generator: Arc<dyn ContentGenerator>,
    pub history: Arc<dyn HistoryStore>,
}
