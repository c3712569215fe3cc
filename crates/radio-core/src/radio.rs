//! Radio pick generation and queueing.
//!
//! Generation runs off the channel task and returns an immutable [`RadioPick`];
//! the channel task applies it with [`enqueue_pick`] after checking the radio epoch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use radio_types::{AnnouncerMode, ChannelId, RadioMode};
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, PickRequest};
use crate::error::GenerationFailed;
use crate::models::{EntryId, Playable, QueueItem, TrackInfo};
use crate::queue_store::QueueStore;
use crate::settings::SchedulerSettings;

/// Inputs captured from the session when a generation starts.
#[derive(Clone, Debug)]
pub struct RadioRequest {
    pub channel: ChannelId,
    pub mode: RadioMode,
    pub announcer: AnnouncerMode,
    pub session_start: bool,
    /// Titles the channel started recently, newest first.
    pub just_played: Vec<String>,
}

/// A resolved song with its introduction.
///
/// Owns its synthesized audio: a pick dropped before [`enqueue_pick`] takes
/// the file deletes it.
#[derive(Debug, PartialEq, Eq)]
pub struct RadioPick {
    pub track: TrackInfo,
    pub intro_text: String,
    pub intro_audio: Option<PathBuf>,
}

impl RadioPick {
    /// Drop the pick, deleting its synthesized audio.
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for RadioPick {
    fn drop(&mut self) {
        if let Some(path) = self.intro_audio.take() {
            discard_intro_audio(&path);
        }
    }
}

#[derive(Clone)]
pub struct RadioCoordinator {
    collaborators: Collaborators,
    settings: Arc<SchedulerSettings>,
}

impl RadioCoordinator {
    pub fn new(collaborators: Collaborators, settings: Arc<SchedulerSettings>) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Ask the generator for a pick and resolve its song.
    ///
    /// On song resolution failure the synthesized intro is deleted and nothing is returned.
    pub async fn generate(&self, request: RadioRequest) -> Result<RadioPick, GenerationFailed> {
        let pick_request = self.pick_request(&request).await;
        debug!(
            channel = %request.channel,
            mode = %request.mode,
            recent = pick_request.recent.len(),
            avoid = pick_request.avoid.len(),
            "requesting radio pick"
        );
        let generated = self
            .collaborators
            .generator
            .next_pick(pick_request)
            .await
            .map_err(|err| GenerationFailed::Generator(err.to_string()))?;

        match self.collaborators.search.resolve(&generated.song_query).await {
            Ok(track) => {
                info!(
                    channel = %request.channel,
                    query = %generated.song_query,
                    title = %track.title,
                    "radio pick resolved"
                );
                Ok(RadioPick {
                    track,
                    intro_text: generated.intro_text,
                    intro_audio: generated.intro_audio,
                })
            }
            Err(err) => {
                if let Some(path) = generated.intro_audio.as_deref() {
                    discard_intro_audio(path);
                }
                Err(GenerationFailed::Resolution {
                    query: generated.song_query,
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn pick_request(&self, request: &RadioRequest) -> PickRequest {
        let history = match self
            .collaborators
            .history
            .recent(&request.channel, self.settings.history_window())
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(channel = %request.channel, error = %err, "history unavailable for radio pick");
                Vec::new()
            }
        };
        // The store may not have recorded the newest plays yet.
        let history: Vec<String> = request
            .just_played
            .iter()
            .cloned()
            .chain(
                history
                    .into_iter()
                    .filter(|title| !request.just_played.contains(title)),
            )
            .collect();
        let split = self.settings.recent_history.min(history.len());
        let recent = history[..split].to_vec();
        let mut avoid = history[split..].to_vec();
        for title in &recent {
            if !avoid.contains(title) {
                avoid.push(title.clone());
            }
        }
        PickRequest {
            recent,
            avoid,
            mood: request.mode.mood().map(str::to_string),
            session_start: request.session_start,
            speak_intro: request.announcer == AnnouncerMode::Full,
        }
    }
}

/// Queue a pick as its announcement (per `announcer`) followed by the radio song.
///
/// Returns the song's entry id.
pub fn enqueue_pick(
    queue: &mut QueueStore,
    mut pick: RadioPick,
    announcer: AnnouncerMode,
) -> EntryId {
    let intro_audio = pick.intro_audio.take();
    let intro_text = std::mem::take(&mut pick.intro_text);
    let song = QueueItem::radio(Playable::from(pick.track.clone()));
    let announcement = match (announcer, intro_audio) {
        (AnnouncerMode::Full, Some(audio_file)) => Some(QueueItem::Intro {
            audio_file,
            text: intro_text,
        }),
        (AnnouncerMode::Full, None) => Some(QueueItem::Text { text: intro_text }),
        (AnnouncerMode::TextOnly, audio) => {
            if let Some(path) = audio {
                discard_intro_audio(&path);
            }
            Some(QueueItem::Text { text: intro_text })
        }
        (AnnouncerMode::Mute, audio) => {
            if let Some(path) = audio {
                discard_intro_audio(&path);
            }
            None
        }
    };
    match announcement {
        Some(announcement) if !announcement.label().trim().is_empty() => {
            queue.enqueue_pair(announcement, song)
        }
        Some(announcement) => {
            if let Some(path) = announcement.intro_file() {
                discard_intro_audio(path);
            }
            queue.enqueue(song)
        }
        None => queue.enqueue(song),
    }
}

/// Best-effort removal of a synthesized intro file.
pub fn discard_intro_audio(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed intro audio"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove intro audio"),
    }
}

/// Reporter for one radio generation.
///
/// Dropping it without calling [`InFlightGuard::finish`] reports
/// [`GenerationFailed::Aborted`], so the in-flight flag is always released.
pub struct InFlightGuard {
    report: Option<Box<dyn FnOnce(Result<RadioPick, GenerationFailed>) + Send>>,
}

impl InFlightGuard {
    pub fn new(report: impl FnOnce(Result<RadioPick, GenerationFailed>) + Send + 'static) -> Self {
        Self {
            report: Some(Box::new(report)),
        }
    }

    pub fn finish(mut self, outcome: Result<RadioPick, GenerationFailed>) {
        if let Some(report) = self.report.take() {
            report(outcome);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(report) = self.report.take() {
            report(Err(GenerationFailed::Aborted));
        }
    }
}
