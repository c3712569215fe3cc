//! Turns queue playables into opened audio sources.

use std::sync::Arc;

use crate::audio_backend::AudioBackend;
use crate::collaborators::SearchResolver;
use crate::error::{ResolutionFailed, SearchError};
use crate::models::{Playable, PlaylistEntry, ResolvedTrack, TrackInfo};

/// Per-channel resolver; opens locators through the channel's backend.
#[derive(Clone)]
pub struct TrackResolver {
    search: Arc<dyn SearchResolver>,
    backend: Arc<dyn AudioBackend>,
}

impl TrackResolver {
    pub fn new(search: Arc<dyn SearchResolver>, backend: Arc<dyn AudioBackend>) -> Self {
        Self { search, backend }
    }

    /// Materialize `playable`. Never retries; callers skip to the next item on failure.
    pub async fn resolve(&self, playable: Playable) -> Result<ResolvedTrack, ResolutionFailed> {
        match playable {
            Playable::Ready {
                handle,
                title,
                duration_seconds,
            } => Ok(ResolvedTrack {
                handle,
                title,
                duration_seconds,
            }),
            Playable::Deferred {
                title,
                locator,
                duration_seconds,
            } => self.open(title, &locator, duration_seconds),
            Playable::Search { query } => {
                let info = self.lookup(&query).await?;
                self.open(info.title, &info.locator, info.duration_seconds)
            }
        }
    }

    /// Search only, without opening. Used to prefetch the queue head.
    pub async fn lookup(&self, query: &str) -> Result<TrackInfo, ResolutionFailed> {
        self.search
            .resolve(query)
            .await
            .map_err(|err| ResolutionFailed::new(query, err))
    }

    /// Expand a playlist URL into entries that are searched again when due.
    pub async fn expand_playlist(&self, url: &str) -> Result<Vec<PlaylistEntry>, SearchError> {
        self.search.resolve_playlist(url).await
    }

    fn open(
        &self,
        title: String,
        locator: &str,
        duration_seconds: Option<u64>,
    ) -> Result<ResolvedTrack, ResolutionFailed> {
        match self.backend.open(locator) {
            Ok(handle) => Ok(ResolvedTrack {
                handle,
                title,
                duration_seconds,
            }),
            Err(err) => Err(ResolutionFailed::new(title, err)),
        }
    }
}
