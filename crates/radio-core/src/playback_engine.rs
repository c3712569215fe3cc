//! Channel task: owns one [`ChannelSession`] and drives its playback.
//!
//! Every mutation arrives as a [`ChannelCommand`], including backend
//! completions and background resolution results, so session state is only
//! ever touched from this task.

use std::path::PathBuf;
use std::sync::Arc;

use radio_types::{AnnouncerMode, ChannelId, NextUp, Origin, RadioMode, SessionSnapshot};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio_backend::{AudioBackend, Completion};
use crate::collaborators::{Collaborators, HistoryStore};
use crate::error::{BackendError, EmptyQueue, GenerationFailed, ResolutionFailed, SearchError};
use crate::events::EventBus;
use crate::handle::ChannelHandle;
use crate::models::{EntryId, PlaylistEntry, QueueEntry, QueueItem, ResolvedTrack, TrackInfo};
use crate::prefetch::PrefetchOutcome;
use crate::radio::{
    InFlightGuard, RadioCoordinator, RadioPick, RadioRequest, discard_intro_audio, enqueue_pick,
};
use crate::session::ChannelSession;
use crate::settings::SchedulerSettings;
use crate::track_resolver::TrackResolver;

pub(crate) enum ChannelCommand {
    Enqueue(QueueItem),
    Play(QueueItem),
    EnqueuePlaylist {
        url: String,
        requester: String,
        reply: oneshot::Sender<Result<usize, SearchError>>,
    },
    PlaylistResolved {
        requester: String,
        result: Result<Vec<PlaylistEntry>, SearchError>,
        reply: oneshot::Sender<Result<usize, SearchError>>,
    },
    Skip,
    Stop,
    PauseToggle,
    SetRadioMode(RadioMode),
    SetAnnouncerMode(AnnouncerMode),
    PeekNext(oneshot::Sender<Option<NextUp>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    TrackFinished {
        seq: u64,
        error: Option<BackendError>,
    },
    PrefetchResolved {
        expected: EntryId,
        result: Result<TrackInfo, ResolutionFailed>,
    },
    RadioFinished {
        epoch: u64,
        outcome: Result<RadioPick, GenerationFailed>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Start the task for `channel` and return its handle.
pub(crate) fn spawn_channel(
    channel: ChannelId,
    backend: Arc<dyn AudioBackend>,
    collaborators: Collaborators,
    settings: Arc<SchedulerSettings>,
    events: EventBus,
) -> ChannelHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = ChannelTask {
        session: ChannelSession::new(channel.clone(), &settings),
        resolver: TrackResolver::new(collaborators.search.clone(), backend.clone()),
        history: collaborators.history.clone(),
        radio: RadioCoordinator::new(collaborators, settings),
        backend,
        events,
        commands: tx.downgrade(),
    };
    tokio::spawn(task.run(rx));
    ChannelHandle::new(channel, tx)
}

struct ChannelTask {
    session: ChannelSession,
    backend: Arc<dyn AudioBackend>,
    resolver: TrackResolver,
    radio: RadioCoordinator,
    history: Arc<dyn HistoryStore>,
    events: EventBus,
    /// Weak so the task ends once every handle is gone.
    commands: mpsc::WeakUnboundedSender<ChannelCommand>,
}

impl ChannelTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ChannelCommand>) {
        info!(channel = %self.session.id(), "channel session started");
        let mut shutdown_reply = None;
        while let Some(command) = rx.recv().await {
            if let ChannelCommand::Shutdown(reply) = command {
                shutdown_reply = Some(reply);
                break;
            }
            self.handle(command).await;
        }
        self.teardown();
        rx.close();
        while let Ok(command) = rx.try_recv() {
            discard_command(command);
        }
        info!(channel = %self.session.id(), "channel session closed");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    async fn handle(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Enqueue(item) => {
                self.enqueue(item);
                self.after_enqueue().await;
            }
            ChannelCommand::Play(item) => {
                self.purge_radio();
                self.enqueue(item);
                self.after_enqueue().await;
            }
            ChannelCommand::EnqueuePlaylist {
                url,
                requester,
                reply,
            } => self.expand_playlist(url, requester, reply),
            ChannelCommand::PlaylistResolved {
                requester,
                result,
                reply,
            } => {
                let outcome = match result {
                    Ok(entries) => {
                        let count = entries.len();
                        if count > 0 {
                            self.purge_radio();
                            for entry in entries {
                                self.session
                                    .queue
                                    .enqueue(QueueItem::user(entry.into_playable(), &requester));
                            }
                            self.events.queue_changed(self.session.id());
                        }
                        info!(channel = %self.session.id(), count, "playlist queued");
                        Ok(count)
                    }
                    Err(err) => {
                        warn!(channel = %self.session.id(), error = %err, "playlist expansion failed");
                        Err(err)
                    }
                };
                let queued = matches!(outcome, Ok(count) if count > 0);
                let _ = reply.send(outcome);
                if queued {
                    self.after_enqueue().await;
                }
            }
            ChannelCommand::Skip => self.skip(),
            ChannelCommand::Stop => self.stop(),
            ChannelCommand::PauseToggle => {
                if let Err(err) = self.backend.pause_toggle() {
                    warn!(channel = %self.session.id(), error = %err, "pause toggle failed");
                }
            }
            ChannelCommand::SetRadioMode(mode) => self.set_radio_mode(mode).await,
            ChannelCommand::SetAnnouncerMode(mode) => {
                info!(channel = %self.session.id(), mode = ?mode, "announcer mode changed");
                self.session.set_announcer_mode(mode);
            }
            ChannelCommand::PeekNext(reply) => {
                let _ = reply.send(self.session.queue().peek_next_displayable());
            }
            ChannelCommand::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            ChannelCommand::TrackFinished { seq, error } => self.on_finished(seq, error).await,
            ChannelCommand::PrefetchResolved { expected, result } => {
                let outcome = self
                    .session
                    .prefetch
                    .apply(&mut self.session.queue, expected, result);
                if matches!(outcome, PrefetchOutcome::Applied(_)) {
                    debug!(channel = %self.session.id(), "prefetched queue head");
                    self.events.queue_changed(self.session.id());
                }
            }
            ChannelCommand::RadioFinished { epoch, outcome } => {
                self.on_radio_finished(epoch, outcome).await
            }
            ChannelCommand::Shutdown(_) => {}
        }
    }

    fn enqueue(&mut self, item: QueueItem) {
        debug!(channel = %self.session.id(), label = %item.label(), "enqueue");
        self.session.queue.enqueue(item);
        self.events.queue_changed(self.session.id());
    }

    async fn after_enqueue(&mut self) {
        if self.session.is_idle() {
            self.advance().await;
        } else {
            self.prefetch_manual();
        }
    }

    /// Drop queued radio picks and make any outstanding generation stale.
    fn purge_radio(&mut self) {
        self.session.invalidate_radio();
        let purged = self.session.queue.purge_radio_candidates();
        if !purged.is_empty() {
            info!(channel = %self.session.id(), removed = purged.len(), "purged radio picks");
            discard_entries(purged);
            self.events.queue_changed(self.session.id());
        }
    }

    fn skip(&mut self) {
        if self.session.is_idle() {
            return;
        }
        info!(channel = %self.session.id(), "skip");
        if let Err(err) = self.backend.stop() {
            warn!(channel = %self.session.id(), error = %err, "failed to stop current source");
        }
    }

    fn stop(&mut self) {
        info!(channel = %self.session.id(), "stop");
        self.reset();
        self.events.queue_changed(self.session.id());
        self.events.idle(self.session.id());
    }

    fn teardown(&mut self) {
        self.reset();
        self.events.idle(self.session.id());
    }

    fn reset(&mut self) {
        let dropped = self.session.on_stop();
        discard_entries(dropped);
        if let Some(path) = self.session.take_finished_intro() {
            discard_intro_audio(&path);
        }
        if let Err(err) = self.backend.stop() {
            warn!(channel = %self.session.id(), error = %err, "failed to stop audio");
        }
    }

    async fn set_radio_mode(&mut self, mode: RadioMode) {
        info!(channel = %self.session.id(), mode = %mode, "radio mode changed");
        let on = mode.is_on();
        self.session.set_radio_mode(mode);
        if on {
            self.resume_radio().await;
        } else {
            let purged = self.session.queue.purge_radio_candidates();
            if !purged.is_empty() {
                discard_entries(purged);
                self.events.queue_changed(self.session.id());
            }
        }
    }

    async fn on_finished(&mut self, seq: u64, error: Option<BackendError>) {
        if !self.session.is_current(seq) {
            debug!(channel = %self.session.id(), seq, "ignoring stale completion");
            return;
        }
        if let Some(err) = error {
            warn!(channel = %self.session.id(), error = %err, "playback ended with error");
        }
        if let Some(path) = self.session.take_finished_intro() {
            discard_intro_audio(&path);
        }
        self.advance().await;
    }

    /// Play the next thing in the queue, skipping anything that cannot start.
    async fn advance(&mut self) {
        loop {
            let entry = match self.session.queue.pop_front() {
                Ok(entry) => entry,
                Err(EmptyQueue) => {
                    self.go_idle();
                    self.start_radio_generation();
                    return;
                }
            };
            self.events.queue_changed(self.session.id());
            match entry.into_item() {
                QueueItem::Intro { audio_file, text } => {
                    self.events.announcement(self.session.id(), &text);
                    if self.start_intro(audio_file) {
                        return;
                    }
                }
                QueueItem::Text { text } => {
                    self.events.announcement(self.session.id(), &text);
                }
                QueueItem::Track { playable, origin } => {
                    match self.resolver.resolve(playable).await {
                        Ok(track) => {
                            if self.start_track(track, origin) {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(channel = %self.session.id(), error = %err, "skipping unplayable item");
                        }
                    }
                }
            }
        }
    }

    fn go_idle(&mut self) {
        if self.session.on_idle() {
            info!(channel = %self.session.id(), "queue finished");
            self.events.idle(self.session.id());
        }
    }

    fn start_intro(&mut self, audio_file: PathBuf) -> bool {
        let seq = self.session.begin_playback();
        let started = self
            .backend
            .open(&audio_file.to_string_lossy())
            .and_then(|handle| self.backend.play(handle, self.completion(seq)));
        match started {
            Ok(()) => {
                self.session.on_intro_started(audio_file);
                true
            }
            Err(err) => {
                warn!(channel = %self.session.id(), error = %err, "intro failed to start");
                discard_intro_audio(&audio_file);
                false
            }
        }
    }

    fn start_track(&mut self, track: ResolvedTrack, origin: Origin) -> bool {
        let seq = self.session.begin_playback();
        if let Err(err) = self.backend.play(track.handle.clone(), self.completion(seq)) {
            warn!(channel = %self.session.id(), title = %track.title, error = %err, "track failed to start");
            return false;
        }
        let now_playing = self.session.on_track_started(&track, &origin, now_ms());
        info!(
            channel = %self.session.id(),
            title = %track.title,
            radio = origin.is_radio(),
            "now playing"
        );
        self.events.now_playing(self.session.id(), &now_playing);
        self.log_play(origin.requester(), &track.title);
        self.prefetch_after_start();
        true
    }

    /// Completion continuation for the source started with `seq`.
    fn completion(&self, seq: u64) -> Completion {
        let commands = self.commands.clone();
        Box::new(move |error| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(ChannelCommand::TrackFinished { seq, error });
            }
        })
    }

    fn log_play(&self, requester: Option<&str>, title: &str) {
        let history = self.history.clone();
        let channel = self.session.id().clone();
        let requester = requester.map(str::to_string);
        let title = title.to_string();
        tokio::spawn(async move {
            if let Err(err) = history
                .log_play(&channel, requester.as_deref(), &title)
                .await
            {
                warn!(channel = %channel, error = %err, "failed to record play");
            }
        });
    }

    fn prefetch_after_start(&mut self) {
        if !self.session.queue().is_empty() {
            self.prefetch_manual();
        } else if self.session.prefetch.radio_enabled() {
            self.start_radio_generation();
        }
    }

    fn prefetch_manual(&mut self) {
        let Some(target) = self.session.prefetch.manual_target(&self.session.queue) else {
            return;
        };
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        debug!(channel = %self.session.id(), query = %target.query, "prefetching queue head");
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let result = resolver.lookup(&target.query).await;
            let _ = tx.send(ChannelCommand::PrefetchResolved {
                expected: target.expected,
                result,
            });
        });
    }

    fn start_radio_generation(&mut self) {
        let Some(ticket) = self.session.begin_radio_generation() else {
            return;
        };
        let Some(tx) = self.commands.upgrade() else {
            self.session.finish_radio_generation(ticket.epoch);
            return;
        };
        let request = RadioRequest {
            channel: self.session.id().clone(),
            mode: self.session.radio_mode().clone(),
            announcer: self.session.announcer_mode(),
            session_start: ticket.session_start,
            just_played: self.session.just_played(),
        };
        debug!(channel = %request.channel, epoch = ticket.epoch, "starting radio generation");
        let epoch = ticket.epoch;
        let guard = InFlightGuard::new(move |outcome| {
            let _ = tx.send(ChannelCommand::RadioFinished { epoch, outcome });
        });
        let radio = self.radio.clone();
        tokio::spawn(async move {
            let outcome = radio.generate(request).await;
            guard.finish(outcome);
        });
    }

    async fn on_radio_finished(&mut self, epoch: u64, outcome: Result<RadioPick, GenerationFailed>) {
        let current = self.session.finish_radio_generation(epoch);
        match outcome {
            Ok(pick) if current => {
                let announcer = self.session.announcer_mode();
                enqueue_pick(&mut self.session.queue, pick, announcer);
                self.events.queue_changed(self.session.id());
                if self.session.is_idle() {
                    self.advance().await;
                } else {
                    self.prefetch_manual();
                }
            }
            Ok(pick) => {
                debug!(channel = %self.session.id(), title = %pick.track.title, "discarding stale radio pick");
                pick.discard();
                self.resume_radio().await;
            }
            Err(err) if current => {
                warn!(channel = %self.session.id(), error = %err, "radio generation failed");
                self.events.radio_failed(self.session.id(), &err.to_string());
            }
            Err(err) => {
                debug!(channel = %self.session.id(), error = %err, "stale radio generation failed");
                self.resume_radio().await;
            }
        }
    }

    /// Kick the radio after a mode change or a discarded result.
    async fn resume_radio(&mut self) {
        if !self.session.radio_mode().is_on() {
            return;
        }
        if self.session.is_idle() {
            self.advance().await;
        } else if self.session.queue().is_empty() && self.session.prefetch.radio_enabled() {
            self.start_radio_generation();
        }
    }

    fn expand_playlist(
        &self,
        url: String,
        requester: String,
        reply: oneshot::Sender<Result<usize, SearchError>>,
    ) {
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let result = resolver.expand_playlist(&url).await;
            let _ = tx.send(ChannelCommand::PlaylistResolved {
                requester,
                result,
                reply,
            });
        });
    }
}

/// Delete audio owned by entries leaving the queue unplayed.
fn discard_entries(entries: Vec<QueueEntry>) {
    for entry in entries {
        if let Some(path) = entry.item().intro_file() {
            discard_intro_audio(path);
        }
    }
}

/// Release what a command left unhandled at shutdown still owns.
fn discard_command(command: ChannelCommand) {
    match command {
        ChannelCommand::Enqueue(item) | ChannelCommand::Play(item) => {
            if let Some(path) = item.intro_file() {
                discard_intro_audio(path);
            }
        }
        ChannelCommand::Shutdown(reply) => {
            let _ = reply.send(());
        }
        // Picks delete their own audio when dropped.
        _ => {}
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::collaborators::GeneratedPick;
    use crate::error::GeneratorError;
    use crate::models::Playable;
    use crate::test_support::{FakeSearch, Fakes, eventually, wait_for};
    use radio_types::{ChannelEventKind, PlaybackState, QueueEntryKind};

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            prefetch_manual: false,
            prefetch_radio: false,
            ..SchedulerSettings::default()
        }
    }

    fn start(fakes: &Fakes, settings: SchedulerSettings) -> (ChannelHandle, EventBus) {
        let events = EventBus::new(1024);
        let handle = spawn_channel(
            ChannelId::from("lobby"),
            fakes.backend.clone(),
            fakes.collaborators(),
            Arc::new(settings),
            events.clone(),
        );
        (handle, events)
    }

    fn user(query: &str) -> QueueItem {
        QueueItem::user(Playable::search(query), "ana")
    }

    fn loc(query: &str) -> String {
        FakeSearch::locator(query)
    }

    async fn wait_played(fakes: &Fakes, count: usize) {
        let backend = fakes.backend.clone();
        eventually("backend plays", move || backend.played().len() >= count).await;
    }

    #[tokio::test]
    async fn plays_user_items_in_fifo_order() {
        let fakes = Fakes::new();
        let (handle, _) = start(&fakes, settings());
        for query in ["a", "b", "c"] {
            handle.enqueue(user(query)).unwrap();
        }

        wait_played(&fakes, 1).await;
        fakes.backend.finish_current();
        wait_played(&fakes, 2).await;
        fakes.backend.finish_current();
        wait_played(&fakes, 3).await;
        fakes.backend.finish_current();

        let snapshot = wait_for(&handle, "idle", |s| s.state == PlaybackState::Idle).await;
        assert!(snapshot.now_playing.is_none());
        assert_eq!(fakes.backend.played(), vec![loc("a"), loc("b"), loc("c")]);
        let history = fakes.history.clone();
        eventually("history", move || history.played("lobby").len() == 3).await;
    }

    #[tokio::test]
    async fn unresolvable_items_are_skipped() {
        let fakes = Fakes::new();
        fakes.search.missing("gone");
        fakes.backend.fail_play(&loc("broken"));
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("gone")).unwrap();
        handle.enqueue(user("broken")).unwrap();
        handle.enqueue(user("fine")).unwrap();

        let snapshot = wait_for(&handle, "fine playing", |s| {
            s.now_playing.as_ref().map(|n| n.title.as_str()) == Some("fine")
        })
        .await;
        assert!(snapshot.queue.is_empty());
        assert_eq!(fakes.backend.played(), vec![loc("fine")]);
    }

    #[tokio::test]
    async fn text_announcements_drain_without_audio() {
        let fakes = Fakes::new();
        let (handle, events) = start(&fakes, settings());
        let mut rx = events.subscribe();
        handle.enqueue(user("a")).unwrap();
        wait_played(&fakes, 1).await;
        for i in 0..50 {
            handle
                .enqueue(QueueItem::Text {
                    text: format!("note {i}"),
                })
                .unwrap();
        }
        handle.enqueue(user("b")).unwrap();
        fakes.backend.finish_current();

        wait_for(&handle, "b playing", |s| {
            s.now_playing.as_ref().map(|n| n.title.as_str()) == Some("b")
        })
        .await;
        assert_eq!(fakes.backend.played(), vec![loc("a"), loc("b")]);

        let mut announcements = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.kind, ChannelEventKind::Announcement { .. }) {
                announcements += 1;
            }
        }
        assert_eq!(announcements, 50);
    }

    #[tokio::test]
    async fn intro_plays_before_its_track_and_file_is_removed() {
        let fakes = Fakes::new();
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("intro.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        let (handle, _) = start(&fakes, settings());
        fakes.generator.respond(Ok(GeneratedPick {
            song_query: "Daft Punk - Digital Love".to_string(),
            intro_text: "Something smooth".to_string(),
            intro_audio: Some(audio.clone()),
        }));
        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let snapshot =
            wait_for(&handle, "announcing", |s| s.state == PlaybackState::Announcing).await;
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].kind, QueueEntryKind::Deferred);
        assert!(snapshot.now_playing.is_none());

        fakes.backend.finish_current();
        let snapshot = wait_for(&handle, "radio track", |s| s.now_playing.is_some()).await;
        let now = snapshot.now_playing.unwrap();
        assert!(now.is_radio_pick);
        assert_eq!(now.title, "Daft Punk - Digital Love");
        assert!(!audio.exists());
        assert_eq!(
            fakes.backend.played(),
            vec![
                audio.to_string_lossy().to_string(),
                loc("Daft Punk - Digital Love")
            ]
        );
    }

    #[tokio::test]
    async fn stale_completion_does_not_advance_twice() {
        let fakes = Fakes::new();
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();
        handle.enqueue(user("c")).unwrap();
        wait_played(&fakes, 1).await;

        // Forge a completion for a sequence that never became current.
        let tx = handle.sender();
        tx.send(ChannelCommand::TrackFinished {
            seq: 99,
            error: None,
        })
        .unwrap();
        let snapshot = handle.snapshot().await.unwrap();

        assert_eq!(snapshot.now_playing.unwrap().title, "a");
        assert_eq!(snapshot.queue.len(), 2);
    }

    #[tokio::test]
    async fn skip_before_prefetch_returns_discards_the_result() {
        let fakes = Fakes::new();
        let release = fakes.search.hold_next("b");
        let _parked = fakes.search.hold_next("c");
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_manual: true,
                ..settings()
            },
        );
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();
        handle.enqueue(user("c")).unwrap();
        wait_played(&fakes, 1).await;
        let search = fakes.search.clone();
        eventually("prefetch of b", move || search.calls().contains(&"b".to_string())).await;

        handle.skip().unwrap();
        let snapshot = wait_for(&handle, "b playing", |s| {
            s.now_playing.as_ref().map(|n| n.title.as_str()) == Some("b")
        })
        .await;
        assert_eq!(snapshot.queue.len(), 1);
        let head_before = snapshot.queue[0].clone();

        release.notify_one();
        let snapshot = wait_for(&handle, "discarded prefetch", |s| s.discarded_prefetches == 1).await;
        assert_eq!(snapshot.queue[0].id, head_before.id);
        assert_eq!(snapshot.queue[0].label, "c");
        assert_eq!(snapshot.queue[0].kind, QueueEntryKind::Search);
    }

    #[tokio::test]
    async fn prefetch_replaces_pending_head() {
        let fakes = Fakes::new();
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_manual: true,
                ..settings()
            },
        );
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();

        let snapshot = wait_for(&handle, "b prefetched", |s| {
            s.queue.first().map(|e| e.kind) == Some(QueueEntryKind::Deferred)
        })
        .await;
        assert_eq!(snapshot.queue[0].origin, Some(Origin::user("ana")));
        assert_eq!(snapshot.discarded_prefetches, 0);
    }

    #[tokio::test]
    async fn radio_generation_clears_flag_on_success() {
        let fakes = Fakes::new();
        fakes.generator.pick("Daft Punk - Aerodynamic");
        let (handle, _) = start(&fakes, settings());

        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let snapshot = wait_for(&handle, "radio track", |s| s.now_playing.is_some()).await;
        assert!(!snapshot.prefetch_in_flight);
        assert!(snapshot.now_playing.unwrap().is_radio_pick);
    }

    #[tokio::test]
    async fn radio_resolution_failure_leaves_nothing_queued() {
        let fakes = Fakes::new();
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("orphan.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        fakes.search.missing("Nobody - Nothing");
        fakes.generator.respond(Ok(GeneratedPick {
            song_query: "Nobody - Nothing".to_string(),
            intro_text: "hello".to_string(),
            intro_audio: Some(audio.clone()),
        }));
        let (handle, events) = start(&fakes, settings());
        let mut rx = events.subscribe();

        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let generator = fakes.generator.clone();
        eventually("generator call", move || generator.requests().len() == 1).await;
        let snapshot = wait_for(&handle, "flag cleared", |s| !s.prefetch_in_flight).await;
        assert!(snapshot.queue.is_empty());
        assert!(!audio.exists());
        let failed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if let ChannelEventKind::RadioFailed { reason } = event.kind {
                    break reason;
                }
            }
        })
        .await
        .unwrap();
        assert!(failed.contains("Nobody - Nothing"));
    }

    #[tokio::test]
    async fn radio_generator_failure_clears_flag() {
        let fakes = Fakes::new();
        fakes
            .generator
            .respond(Err(GeneratorError::Malformed("empty reply".to_string())));
        let (handle, _) = start(&fakes, settings());

        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let generator = fakes.generator.clone();
        eventually("generator call", move || generator.requests().len() == 1).await;
        let snapshot = wait_for(&handle, "flag cleared", |s| !s.prefetch_in_flight).await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.radio_mode, RadioMode::Auto);
        assert_eq!(fakes.generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn specific_mode_pick_avoids_history_and_is_radio_pick() {
        let fakes = Fakes::new();
        fakes.history.push("lobby", "Daft Punk - One More Time");
        fakes.generator.pick("Daft Punk - Harder Better Faster Stronger");
        let (handle, _) = start(&fakes, settings());

        handle
            .set_radio_mode(RadioMode::Specific("Daft Punk".to_string()))
            .unwrap();

        let snapshot = wait_for(&handle, "radio track", |s| s.now_playing.is_some()).await;
        assert!(snapshot.now_playing.unwrap().is_radio_pick);
        let request = &fakes.generator.requests()[0];
        assert_eq!(request.mood.as_deref(), Some("Daft Punk"));
        assert!(
            request
                .avoid
                .contains(&"Daft Punk - One More Time".to_string())
        );
        assert!(request.session_start);
    }

    #[tokio::test]
    async fn mute_announcer_queues_only_the_song() {
        let fakes = Fakes::new();
        fakes.generator.pick("a");
        fakes.generator.pick("b");
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_radio: true,
                ..settings()
            },
        );
        handle.set_announcer_mode(AnnouncerMode::Mute).unwrap();
        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let snapshot = wait_for(&handle, "radio pick queued behind a", |s| {
            s.now_playing.is_some() && !s.queue.is_empty()
        })
        .await;
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].origin, Some(Origin::Radio));
        assert!(!fakes.generator.requests()[0].speak_intro);
    }

    #[tokio::test]
    async fn user_play_purges_radio_picks() {
        let fakes = Fakes::new();
        fakes.generator.pick("radio one");
        fakes.generator.pick("radio two");
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_radio: true,
                ..settings()
            },
        );
        handle.set_radio_mode(RadioMode::Auto).unwrap();
        wait_for(&handle, "radio pick queued", |s| {
            s.now_playing.is_some() && s.queue.len() == 2
        })
        .await;

        handle.play(user("mine")).unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].label, "mine");
        assert_eq!(
            handle.peek_next().await.unwrap().unwrap().to_string(),
            "mine (requested by ana)"
        );
    }

    #[tokio::test]
    async fn stale_pick_after_user_play_is_discarded_and_radio_resumes() {
        let fakes = Fakes::new();
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("stale.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_radio: true,
                ..settings()
            },
        );
        handle.enqueue(user("a")).unwrap();
        wait_played(&fakes, 1).await;
        let release = fakes.generator.hold_next();
        fakes.generator.respond(Ok(GeneratedPick {
            song_query: "radio one".to_string(),
            intro_text: "First up".to_string(),
            intro_audio: Some(audio.clone()),
        }));
        fakes.generator.pick("radio two");
        handle.set_radio_mode(RadioMode::Auto).unwrap();
        let generator = fakes.generator.clone();
        eventually("first generation", move || generator.requests().len() == 1).await;

        handle.play(user("mine")).unwrap();
        release.notify_one();

        let stale = audio.clone();
        eventually("stale intro removed", move || !stale.exists()).await;
        let snapshot = wait_for(&handle, "flag cleared", |s| !s.prefetch_in_flight).await;
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].label, "mine");
        assert_eq!(fakes.generator.requests().len(), 1);

        fakes.backend.finish_current();
        let snapshot = wait_for(&handle, "next radio pick queued", |s| {
            s.now_playing.as_ref().is_some_and(|now| now.title == "mine")
                && s.queue.iter().any(|e| e.origin == Some(Origin::Radio))
        })
        .await;
        let radio: Vec<_> = snapshot
            .queue
            .iter()
            .filter(|e| e.origin == Some(Origin::Radio))
            .collect();
        assert_eq!(radio.len(), 1);
        assert_eq!(radio[0].label, "radio two");
        assert_eq!(fakes.generator.requests().len(), 2);
    }

    #[tokio::test]
    async fn intro_that_fails_to_start_is_skipped_and_deleted() {
        let fakes = Fakes::new();
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("broken.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        fakes.backend.fail_play(&audio.to_string_lossy());
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("a")).unwrap();
        wait_played(&fakes, 1).await;
        handle
            .enqueue(QueueItem::Intro {
                audio_file: audio.clone(),
                text: "Coming up".to_string(),
            })
            .unwrap();
        handle.enqueue(user("b")).unwrap();

        fakes.backend.finish_current();

        let snapshot = wait_for(&handle, "b playing", |s| {
            s.now_playing.as_ref().is_some_and(|now| now.title == "b")
        })
        .await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(snapshot.queue.is_empty());
        assert_eq!(fakes.backend.played(), vec![loc("a"), loc("b")]);
        assert!(!audio.exists());
    }

    #[tokio::test]
    async fn radio_avoids_a_track_the_history_has_not_recorded_yet() {
        let fakes = Fakes::new();
        fakes.history.delay_logs(Duration::from_millis(500));
        fakes.generator.pick("Daft Punk - One More Time");
        fakes.generator.pick("Daft Punk - Voyager");
        let (handle, _) = start(
            &fakes,
            SchedulerSettings {
                prefetch_radio: true,
                ..settings()
            },
        );

        handle.set_radio_mode(RadioMode::Auto).unwrap();

        let generator = fakes.generator.clone();
        eventually("prefetch generation", move || generator.requests().len() == 2).await;
        assert!(fakes.history.played("lobby").is_empty());
        let request = &fakes.generator.requests()[1];
        assert_eq!(request.recent[0], "Daft Punk - One More Time");
        assert!(
            request
                .avoid
                .contains(&"Daft Punk - One More Time".to_string())
        );
    }

    #[tokio::test]
    async fn disconnect_during_generation_deletes_the_late_intro() {
        let fakes = Fakes::new();
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("late.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        let release = fakes.generator.hold_next();
        fakes.generator.respond(Ok(GeneratedPick {
            song_query: "Daft Punk - Veridis Quo".to_string(),
            intro_text: "Late night".to_string(),
            intro_audio: Some(audio.clone()),
        }));
        let (handle, _) = start(&fakes, settings());
        handle.set_radio_mode(RadioMode::Auto).unwrap();
        let generator = fakes.generator.clone();
        eventually("generation started", move || generator.requests().len() == 1).await;

        handle.disconnect().await.unwrap();
        release.notify_one();

        let late = audio.clone();
        eventually("late intro removed", move || !late.exists()).await;
        assert!(fakes.backend.played().is_empty());
    }

    #[tokio::test]
    async fn stop_clears_everything_and_turns_radio_off() {
        let fakes = Fakes::new();
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();
        wait_for(&handle, "a playing", |s| s.now_playing.is_some()).await;
        handle.set_radio_mode(RadioMode::Auto).unwrap();

        handle.stop().unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.now_playing.is_none());
        assert_eq!(snapshot.radio_mode, RadioMode::Off);
        assert_eq!(fakes.backend.stops(), 1);

        // The stopped source's completion must not start anything.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fakes.backend.played(), vec![loc("a")]);
    }

    #[tokio::test]
    async fn pause_passes_through_without_touching_the_queue() {
        let fakes = Fakes::new();
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();
        wait_played(&fakes, 1).await;

        handle.pause_toggle().unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(fakes.backend.pause_toggles(), 1);
        assert_eq!(snapshot.queue.len(), 1);
    }

    #[tokio::test]
    async fn playlist_entries_are_queued_for_the_requester() {
        let fakes = Fakes::new();
        fakes.search.playlist(
            "https://list.test/mix",
            vec![
                PlaylistEntry {
                    title: "one".to_string(),
                    locator: None,
                },
                PlaylistEntry {
                    title: "two".to_string(),
                    locator: None,
                },
            ],
        );
        let (handle, _) = start(&fakes, settings());

        let count = handle
            .enqueue_playlist("https://list.test/mix", "ana")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(count, 2);
        let snapshot = wait_for(&handle, "one playing", |s| s.now_playing.is_some()).await;
        assert_eq!(snapshot.now_playing.unwrap().requester.as_deref(), Some("ana"));
        assert_eq!(snapshot.queue[0].label, "two");

        let missing = handle
            .enqueue_playlist("https://list.test/none", "ana")
            .await
            .unwrap();
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn disconnect_tears_down_and_closes_the_task() {
        let fakes = Fakes::new();
        let (handle, _) = start(&fakes, settings());
        handle.enqueue(user("a")).unwrap();
        handle.enqueue(user("b")).unwrap();
        wait_played(&fakes, 1).await;

        handle.disconnect().await.unwrap();

        assert_eq!(fakes.backend.stops(), 1);
        assert!(matches!(
            handle.snapshot().await,
            Err(crate::error::SchedulerError::ChannelClosed)
        ));
    }
}
