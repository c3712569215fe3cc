//! Per-channel scheduler state.
//!
//! One `ChannelSession` is owned by each channel task; nothing else mutates it.

use std::collections::VecDeque;
use std::path::PathBuf;

use radio_types::{
    AnnouncerMode, ChannelId, NowPlaying, Origin, PlaybackState, RadioMode, SessionSnapshot,
};

use crate::models::{QueueEntry, ResolvedTrack};
use crate::prefetch::PrefetchGuard;
use crate::queue_store::QueueStore;
use crate::settings::SchedulerSettings;

/// Permission to run one radio generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadioTicket {
    pub epoch: u64,
    pub session_start: bool,
}

#[derive(Debug)]
pub struct ChannelSession {
    id: ChannelId,
    pub(crate) queue: QueueStore,
    pub(crate) prefetch: PrefetchGuard,
    now_playing: Option<NowPlaying>,
    state: PlaybackState,
    radio_mode: RadioMode,
    announcer_mode: AnnouncerMode,
    prefetch_in_flight: bool,
    playback_seq: u64,
    radio_epoch: u64,
    radio_session_start: bool,
    current_intro: Option<PathBuf>,
    /// Titles started on this channel, newest first. Covers plays the history
    /// store has not recorded yet.
    started_titles: VecDeque<String>,
    started_cap: usize,
}

impl ChannelSession {
    pub fn new(id: ChannelId, settings: &SchedulerSettings) -> Self {
        Self {
            id,
            queue: QueueStore::new(),
            prefetch: PrefetchGuard::new(settings),
            now_playing: None,
            state: PlaybackState::Idle,
            radio_mode: RadioMode::Off,
            announcer_mode: settings.default_announcer,
            prefetch_in_flight: false,
            playback_seq: 0,
            radio_epoch: 0,
            radio_session_start: false,
            current_intro: None,
            started_titles: VecDeque::new(),
            started_cap: settings.recent_history.max(1),
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PlaybackState::Idle
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn radio_mode(&self) -> &RadioMode {
        &self.radio_mode
    }

    pub fn announcer_mode(&self) -> AnnouncerMode {
        self.announcer_mode
    }

    pub fn prefetch_in_flight(&self) -> bool {
        self.prefetch_in_flight
    }

    pub fn radio_epoch(&self) -> u64 {
        self.radio_epoch
    }

    /// Recently started titles, newest first.
    pub fn just_played(&self) -> Vec<String> {
        self.started_titles.iter().cloned().collect()
    }

    /// Reserve a sequence number for the next started source.
    pub fn begin_playback(&mut self) -> u64 {
        self.playback_seq += 1;
        self.playback_seq
    }

    /// Whether a completion tagged `seq` belongs to the source playing now.
    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.playback_seq && !self.is_idle()
    }

    pub fn on_track_started(
        &mut self,
        track: &ResolvedTrack,
        origin: &Origin,
        started_at_ms: i64,
    ) -> NowPlaying {
        let now_playing = NowPlaying {
            title: track.title.clone(),
            duration_seconds: track.duration_seconds,
            started_at_ms,
            is_radio_pick: origin.is_radio(),
            requester: origin.requester().map(str::to_string),
        };
        self.state = PlaybackState::Playing;
        self.now_playing = Some(now_playing.clone());
        self.started_titles.retain(|title| title != &track.title);
        self.started_titles.push_front(track.title.clone());
        self.started_titles.truncate(self.started_cap);
        now_playing
    }

    /// Intros leave `now_playing` pointing at the previous track.
    pub fn on_intro_started(&mut self, audio_file: PathBuf) {
        self.state = PlaybackState::Announcing;
        self.current_intro = Some(audio_file);
    }

    /// Intro file of the announcement that just ended, if one was playing.
    pub fn take_finished_intro(&mut self) -> Option<PathBuf> {
        self.current_intro.take()
    }

    /// Returns `true` if the session was not idle before.
    pub fn on_idle(&mut self) -> bool {
        let was_active = !self.is_idle() || self.now_playing.is_some();
        self.state = PlaybackState::Idle;
        self.now_playing = None;
        was_active
    }

    /// Reset everything a `stop` or disconnect discards. Returns the dropped queue entries.
    pub fn on_stop(&mut self) -> Vec<QueueEntry> {
        self.playback_seq += 1;
        self.radio_epoch += 1;
        self.state = PlaybackState::Idle;
        self.now_playing = None;
        self.radio_mode = RadioMode::Off;
        self.radio_session_start = false;
        self.prefetch.reset();
        self.queue.clear()
    }

    /// Switch radio mode. Results generated under the previous mode are discarded.
    pub fn set_radio_mode(&mut self, mode: RadioMode) {
        self.radio_epoch += 1;
        self.radio_session_start = mode.is_on();
        self.radio_mode = mode;
    }

    pub fn set_announcer_mode(&mut self, mode: AnnouncerMode) {
        self.announcer_mode = mode;
    }

    /// Make any outstanding radio generation stale without changing modes.
    pub fn invalidate_radio(&mut self) {
        self.radio_epoch += 1;
    }

    /// Claim the single radio generation slot, if radio is on and the slot is free.
    pub fn begin_radio_generation(&mut self) -> Option<RadioTicket> {
        if !self.radio_mode.is_on() || self.prefetch_in_flight {
            return None;
        }
        self.prefetch_in_flight = true;
        Some(RadioTicket {
            epoch: self.radio_epoch,
            session_start: std::mem::take(&mut self.radio_session_start),
        })
    }

    /// Release the generation slot. Returns whether a result for `epoch` may still be applied.
    pub fn finish_radio_generation(&mut self, epoch: u64) -> bool {
        self.prefetch_in_flight = false;
        epoch == self.radio_epoch && self.radio_mode.is_on()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            channel_id: self.id.clone(),
            state: self.state,
            now_playing: self.now_playing.clone(),
            queue: self.queue.views(),
            radio_mode: self.radio_mode.clone(),
            announcer_mode: self.announcer_mode,
            prefetch_in_flight: self.prefetch_in_flight,
            discarded_prefetches: self.prefetch.discarded(),
        }
    }
}
