//! Queue item model.
//!
//! Playables (ready sources, deferred URLs, pending searches) always travel
//! with their [`Origin`]; announcements never do.

use std::path::{Path, PathBuf};

use radio_types::{Origin, QueueEntryKind, QueueEntryView};

/// Opaque handle to an audio source opened by an [`crate::AudioBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioHandle {
    locator: String,
}

impl AudioHandle {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
        }
    }

    /// Stream URL or file path backing this handle.
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// Something that can eventually produce audio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Playable {
    /// Already opened; plays immediately.
    Ready {
        handle: AudioHandle,
        title: String,
        duration_seconds: Option<u64>,
    },
    /// Known locator that still has to be opened.
    Deferred {
        title: String,
        locator: String,
        duration_seconds: Option<u64>,
    },
    /// Free text that needs a search before playback.
    Search { query: String },
}

impl Playable {
    pub fn search(query: impl Into<String>) -> Self {
        Playable::Search {
            query: query.into(),
        }
    }

    /// Title, or the query for unresolved searches.
    pub fn label(&self) -> &str {
        match self {
            Playable::Ready { title, .. } | Playable::Deferred { title, .. } => title,
            Playable::Search { query } => query,
        }
    }

    fn kind(&self) -> QueueEntryKind {
        match self {
            Playable::Ready { .. } => QueueEntryKind::Ready,
            Playable::Deferred { .. } => QueueEntryKind::Deferred,
            Playable::Search { .. } => QueueEntryKind::Search,
        }
    }
}

impl From<TrackInfo> for Playable {
    fn from(info: TrackInfo) -> Self {
        Playable::Deferred {
            title: info.title,
            locator: info.locator,
            duration_seconds: info.duration_seconds,
        }
    }
}

/// One schedulable unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem {
    /// Real content, tagged with who asked for it.
    Track { playable: Playable, origin: Origin },
    /// Spoken announcement; plays its own audio before the next item.
    Intro { audio_file: PathBuf, text: String },
    /// Visual-only announcement.
    Text { text: String },
}

impl QueueItem {
    /// A track requested by a person.
    pub fn user(playable: Playable, requester: impl Into<String>) -> Self {
        QueueItem::Track {
            playable,
            origin: Origin::user(requester),
        }
    }

    /// A track picked by the radio.
    pub fn radio(playable: Playable) -> Self {
        QueueItem::Track {
            playable,
            origin: Origin::Radio,
        }
    }

    pub fn is_announcement(&self) -> bool {
        matches!(self, QueueItem::Intro { .. } | QueueItem::Text { .. })
    }

    pub fn is_radio_candidate(&self) -> bool {
        matches!(
            self,
            QueueItem::Track {
                origin: Origin::Radio,
                ..
            }
        )
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            QueueItem::Track { origin, .. } => Some(origin),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            QueueItem::Track { playable, .. } => playable.label(),
            QueueItem::Intro { text, .. } | QueueItem::Text { text } => text,
        }
    }

    /// Synthesized audio owned by this item, if any.
    pub fn intro_file(&self) -> Option<&Path> {
        match self {
            QueueItem::Intro { audio_file, .. } => Some(audio_file),
            _ => None,
        }
    }

    pub fn kind(&self) -> QueueEntryKind {
        match self {
            QueueItem::Track { playable, .. } => playable.kind(),
            QueueItem::Intro { .. } => QueueEntryKind::Intro,
            QueueItem::Text { .. } => QueueEntryKind::Text,
        }
    }
}

/// Identity of one queue slot occupant. Never reused within a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u64);

impl EntryId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Links a radio announcement to the candidate it introduces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PairId(pub(crate) u64);

/// A queue item plus its identity.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub(crate) id: EntryId,
    pub(crate) pair: Option<PairId>,
    pub(crate) item: QueueItem,
}

impl QueueEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn item(&self) -> &QueueItem {
        &self.item
    }

    pub fn into_item(self) -> QueueItem {
        self.item
    }

    pub fn view(&self) -> QueueEntryView {
        QueueEntryView {
            id: self.id.0,
            kind: self.item.kind(),
            label: self.item.label().to_string(),
            origin: self.item.origin().cloned(),
        }
    }
}

/// Descriptor returned by a search backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    /// Direct stream URL or file path.
    pub locator: String,
    pub duration_seconds: Option<u64>,
}

/// One row of an expanded playlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    /// Page URL of the entry, when the backend knows one.
    pub locator: Option<String>,
}

impl PlaylistEntry {
    /// Playlist rows are searched again when due, by locator when known.
    pub fn into_playable(self) -> Playable {
        Playable::search(self.locator.unwrap_or(self.title))
    }
}

/// A playable that has been opened and is ready to start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub handle: AudioHandle,
    pub title: String,
    pub duration_seconds: Option<u64>,
}
