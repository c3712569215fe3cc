use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a voice destination (guild/channel) owning one playback session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether the channel keeps generating tracks once the queue runs dry.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "target", rename_all = "snake_case")]
pub enum RadioMode {
    /// No automatic picks.
    #[default]
    Off,
    /// Follow the vibe of recent history.
    Auto,
    /// Constrain every pick to an artist or genre.
    Specific(String),
}

impl RadioMode {
    pub fn is_on(&self) -> bool {
        !matches!(self, RadioMode::Off)
    }

    /// Mood hint forwarded to the content generator.
    pub fn mood(&self) -> Option<&str> {
        match self {
            RadioMode::Specific(target) => Some(target.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioMode::Off => f.write_str("off"),
            RadioMode::Auto => f.write_str("auto"),
            RadioMode::Specific(target) => write!(f, "specific({target})"),
        }
    }
}

/// Error returned when a mode string cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseModeError(pub String);

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode: {:?}", self.0)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for RadioMode {
    type Err = ParseModeError;

    /// `off` and `auto` are keywords; anything else becomes a specific target.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseModeError(s.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "off" => Ok(RadioMode::Off),
            "auto" => Ok(RadioMode::Auto),
            _ => Ok(RadioMode::Specific(trimmed.to_string())),
        }
    }
}

/// How radio picks are introduced.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncerMode {
    /// Spoken intro audio (text fallback when no audio is available).
    #[default]
    Full,
    /// Visual-only commentary.
    TextOnly,
    /// No introductions at all.
    Mute,
}

impl FromStr for AnnouncerMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "voice" => Ok(AnnouncerMode::Full),
            "text" | "text_only" | "textonly" => Ok(AnnouncerMode::TextOnly),
            "mute" | "off" => Ok(AnnouncerMode::Mute),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Who put a track into the queue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Requested by a person.
    User { requester: String },
    /// Picked by the radio.
    Radio,
}

impl Origin {
    pub fn user(requester: impl Into<String>) -> Self {
        Origin::User {
            requester: requester.into(),
        }
    }

    pub fn is_radio(&self) -> bool {
        matches!(self, Origin::Radio)
    }

    pub fn requester(&self) -> Option<&str> {
        match self {
            Origin::User { requester } => Some(requester.as_str()),
            Origin::Radio => None,
        }
    }
}

/// Track currently playing on a channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NowPlaying {
    /// Display title.
    pub title: String,
    /// Duration in seconds, when known.
    pub duration_seconds: Option<u64>,
    /// Unix timestamp (ms) when playback started.
    pub started_at_ms: i64,
    /// `true` when the radio picked this track.
    pub is_radio_pick: bool,
    /// Person who requested the track, if any.
    pub requester: Option<String>,
}

/// Preview of the next piece of content (announcements skipped).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextUp {
    pub title: String,
    pub origin: Origin,
}

impl fmt::Display for NextUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::User { requester } => write!(f, "{} (requested by {requester})", self.title),
            Origin::Radio => write!(f, "{} (radio pick)", self.title),
        }
    }
}

/// Queue entry kinds as shown to front-ends.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryKind {
    Ready,
    Deferred,
    Search,
    Intro,
    Text,
}

/// Display row for one queue entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntryView {
    /// Entry identity inside the queue.
    pub id: u64,
    pub kind: QueueEntryKind,
    /// Title, query or announcement text.
    pub label: String,
    /// Provenance for playable entries.
    pub origin: Option<Origin>,
}

/// Playback engine state for one channel.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    /// A track is playing.
    Playing,
    /// A spoken intro is playing.
    Announcing,
}

/// Point-in-time view of a channel session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub channel_id: ChannelId,
    pub state: PlaybackState,
    pub now_playing: Option<NowPlaying>,
    pub queue: Vec<QueueEntryView>,
    pub radio_mode: RadioMode,
    pub announcer_mode: AnnouncerMode,
    /// `true` while a radio generation is outstanding.
    pub prefetch_in_flight: bool,
    /// Background resolutions dropped because their queue slot changed.
    pub discarded_prefetches: u64,
}

/// Channel event payloads published by the scheduler.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEventKind {
    QueueChanged,
    NowPlaying(NowPlaying),
    Announcement { text: String },
    Idle,
    /// Radio could not produce a pick; shown once to users.
    RadioFailed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub kind: ChannelEventKind,
}
