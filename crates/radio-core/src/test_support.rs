//! Hand-written fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use radio_types::{ChannelId, SessionSnapshot};
use tokio::sync::Notify;

use crate::audio_backend::{AudioBackend, Completion};
use crate::collaborators::{
    Collaborators, ContentGenerator, GeneratedPick, HistoryStore, PickRequest, SearchResolver,
};
use crate::error::{BackendError, GeneratorError, HistoryError, SearchError};
use crate::handle::ChannelHandle;
use crate::models::{AudioHandle, PlaylistEntry, TrackInfo};

#[derive(Default)]
struct BackendState {
    opened: Vec<String>,
    played: Vec<String>,
    current: Option<Completion>,
    fail_open: HashSet<String>,
    fail_play: HashSet<String>,
    stops: usize,
    pause_toggles: usize,
}

/// Records calls and fires completions from a separate thread, like a real output.
#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub(crate) fn fail_open(&self, locator: &str) {
        self.state.lock().unwrap().fail_open.insert(locator.to_string());
    }

    pub(crate) fn fail_play(&self, locator: &str) {
        self.state.lock().unwrap().fail_play.insert(locator.to_string());
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Locators passed to `play`, in order.
    pub(crate) fn played(&self) -> Vec<String> {
        self.state.lock().unwrap().played.clone()
    }

    pub(crate) fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub(crate) fn pause_toggles(&self) -> usize {
        self.state.lock().unwrap().pause_toggles
    }

    /// End the current source naturally.
    pub(crate) fn finish_current(&self) {
        let completion = self.state.lock().unwrap().current.take();
        if let Some(completion) = completion {
            fire(completion);
        }
    }
}

fn fire(completion: Completion) {
    std::thread::spawn(move || completion(None));
}

impl AudioBackend for FakeBackend {
    fn open(&self, locator: &str) -> Result<AudioHandle, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.opened.push(locator.to_string());
        if state.fail_open.contains(locator) {
            return Err(BackendError::Open {
                locator: locator.to_string(),
                reason: "unreachable".to_string(),
            });
        }
        Ok(AudioHandle::new(locator))
    }

    fn play(&self, handle: AudioHandle, on_complete: Completion) -> Result<(), BackendError> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            if state.fail_play.contains(handle.locator()) {
                return Err(BackendError::Start("device busy".to_string()));
            }
            state.played.push(handle.locator().to_string());
            state.current.replace(on_complete)
        };
        if let Some(previous) = previous {
            fire(previous);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), BackendError> {
        let completion = {
            let mut state = self.state.lock().unwrap();
            state.stops += 1;
            state.current.take()
        };
        if let Some(completion) = completion {
            fire(completion);
        }
        Ok(())
    }

    fn pause_toggle(&self) -> Result<(), BackendError> {
        self.state.lock().unwrap().pause_toggles += 1;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

#[derive(Default)]
struct SearchState {
    calls: Vec<String>,
    missing: HashSet<String>,
    holds: HashMap<String, Arc<Notify>>,
    playlists: HashMap<String, Vec<PlaylistEntry>>,
}

/// Resolves every query to a track titled after it unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeSearch {
    state: Mutex<SearchState>,
}

impl FakeSearch {
    pub(crate) fn locator(query: &str) -> String {
        format!("https://media.test/{query}")
    }

    pub(crate) fn missing(&self, query: &str) {
        self.state.lock().unwrap().missing.insert(query.to_string());
    }

    /// Park the next lookup of `query` until the returned notify fires.
    pub(crate) fn hold_next(&self, query: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .holds
            .insert(query.to_string(), notify.clone());
        notify
    }

    pub(crate) fn playlist(&self, url: &str, entries: Vec<PlaylistEntry>) {
        self.state
            .lock()
            .unwrap()
            .playlists
            .insert(url.to_string(), entries);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SearchResolver for FakeSearch {
    async fn resolve(&self, query: &str) -> Result<TrackInfo, SearchError> {
        let hold = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(query.to_string());
            state.holds.remove(query)
        };
        if let Some(hold) = hold {
            hold.notified().await;
        }
        if self.state.lock().unwrap().missing.contains(query) {
            return Err(SearchError::NotFound(query.to_string()));
        }
        Ok(TrackInfo {
            title: query.to_string(),
            locator: Self::locator(query),
            duration_seconds: Some(180),
        })
    }

    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistEntry>, SearchError> {
        self.state
            .lock()
            .unwrap()
            .playlists
            .get(url)
            .cloned()
            .ok_or_else(|| SearchError::NotFound(url.to_string()))
    }
}

/// Replays scripted picks and records every request.
#[derive(Default)]
pub(crate) struct FakeGenerator {
    responses: Mutex<VecDeque<Result<GeneratedPick, GeneratorError>>>,
    requests: Mutex<Vec<PickRequest>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeGenerator {
    pub(crate) fn respond(&self, response: Result<GeneratedPick, GeneratorError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Script a text-only pick for `song_query`.
    pub(crate) fn pick(&self, song_query: &str) {
        self.respond(Ok(GeneratedPick {
            song_query: song_query.to_string(),
            intro_text: format!("Up next, {song_query}"),
            intro_audio: None,
        }));
    }

    pub(crate) fn requests(&self) -> Vec<PickRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Park the next request, after recording it, until the returned notify fires.
    pub(crate) fn hold_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn next_pick(&self, request: PickRequest) -> Result<GeneratedPick, GeneratorError> {
        self.requests.lock().unwrap().push(request);
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Request("no scripted pick".to_string())))
    }
}

/// In-memory history, oldest first per channel.
#[derive(Default)]
pub(crate) struct FakeHistory {
    plays: Mutex<HashMap<String, Vec<String>>>,
    log_delay: Mutex<Option<Duration>>,
}

impl FakeHistory {
    /// Make every `log_play` take `delay` before the play is recorded.
    pub(crate) fn delay_logs(&self, delay: Duration) {
        *self.log_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn push(&self, channel: &str, title: &str) {
        self.plays
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(title.to_string());
    }

    pub(crate) fn played(&self, channel: &str) -> Vec<String> {
        self.plays
            .lock()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for FakeHistory {
    async fn recent(&self, channel: &ChannelId, limit: usize) -> Result<Vec<String>, HistoryError> {
        Ok(self
            .played(channel.as_str())
            .into_iter()
            .rev()
            .take(limit)
            .collect())
    }

    async fn log_play(
        &self,
        channel: &ChannelId,
        _requester: Option<&str>,
        title: &str,
    ) -> Result<(), HistoryError> {
        let delay = *self.log_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.push(channel.as_str(), title);
        Ok(())
    }
}

pub(crate) struct Fakes {
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) search: Arc<FakeSearch>,
    pub(crate) generator: Arc<FakeGenerator>,
    pub(crate) history: Arc<FakeHistory>,
}

impl Fakes {
    pub(crate) fn new() -> Self {
        Self {
            backend: Arc::new(FakeBackend::default()),
            search: Arc::new(FakeSearch::default()),
            generator: Arc::new(FakeGenerator::default()),
            history: Arc::new(FakeHistory::default()),
        }
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            search: self.search.clone(),
            generator: self.generator.clone(),
            history: self.history.clone(),
        }
    }
}

/// Poll until `check` holds, panicking after about two seconds.
pub(crate) async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Poll channel snapshots until `predicate` holds.
pub(crate) async fn wait_for(
    handle: &ChannelHandle,
    what: &str,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..200 {
        let snapshot = handle.snapshot().await.unwrap();
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
