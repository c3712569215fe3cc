//! Line-oriented console commands for one channel.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use radio_core::radio::discard_intro_audio;
use radio_core::{
    ChannelHandle, ContentGenerator, HistoryStore, PickRequest, Playable, QueueItem,
    SchedulerSettings,
};
use radio_types::{AnnouncerMode, RadioMode, SessionSnapshot};
use tracing::{info, warn};

use crate::history_db::HistoryDb;

pub const HELP: &str = "\
commands:
  play <query|url>        queue it, dropping radio picks
  add <query|url>         append to the queue
  playlist <url>          append every playlist entry
  dj <mood>               queue one generated pick for a mood
  skip | stop | pause
  radio <off|auto|target> set radio mode
  announcer <full|text|mute>
  next | queue | status
  resetradio              forget this channel's play history
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play(String),
    Add(String),
    Playlist(String),
    Dj(String),
    Skip,
    Stop,
    Pause,
    Radio(RadioMode),
    Announcer(AnnouncerMode),
    Next,
    Queue,
    Status,
    ResetRadio,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let needs_arg = |what: &str| -> Result<String> {
        if rest.is_empty() {
            Err(anyhow!("{word} needs {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => ConsoleCommand::Play(needs_arg("a query or url")?),
        "add" | "enqueue" | "a" => ConsoleCommand::Add(needs_arg("a query or url")?),
        "playlist" => ConsoleCommand::Playlist(needs_arg("a playlist url")?),
        "dj" => ConsoleCommand::Dj(needs_arg("a mood")?),
        "skip" | "s" => ConsoleCommand::Skip,
        "stop" => ConsoleCommand::Stop,
        "pause" | "resume" => ConsoleCommand::Pause,
        "radio" => ConsoleCommand::Radio(needs_arg("off, auto or a target")?.parse()?),
        "announcer" => ConsoleCommand::Announcer(needs_arg("full, text or mute")?.parse()?),
        "next" => ConsoleCommand::Next,
        "queue" | "q" => ConsoleCommand::Queue,
        "status" => ConsoleCommand::Status,
        "resetradio" => ConsoleCommand::ResetRadio,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(anyhow!("unknown command {other:?} (try help)")),
    };
    Ok(Some(cmd))
}

/// Executes console commands against a channel on behalf of one requester.
pub struct Console {
    handle: ChannelHandle,
    history: HistoryDb,
    generator: Arc<dyn ContentGenerator>,
    recent_history: usize,
    history_window: usize,
    requester: String,
}

impl Console {
    pub fn new(
        handle: ChannelHandle,
        history: HistoryDb,
        generator: Arc<dyn ContentGenerator>,
        settings: &SchedulerSettings,
        requester: String,
    ) -> Self {
        Self {
            handle,
            history,
            generator,
            recent_history: settings.recent_history,
            history_window: settings.history_window(),
            requester,
        }
    }

    /// Ask the generator for one song in `mood` and queue it for the requester.
    async fn dj(&self, mood: String) -> Result<String> {
        let history = match self
            .history
            .recent(self.handle.channel(), self.history_window)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(channel = %self.handle.channel(), error = %err, "history unavailable for dj pick");
                Vec::new()
            }
        };
        let pick = self
            .generator
            .next_pick(dj_request(mood, history, self.recent_history))
            .await
            .context("dj pick")?;
        if let Some(path) = pick.intro_audio.as_deref() {
            discard_intro_audio(path);
        }
        info!(channel = %self.handle.channel(), query = %pick.song_query, "dj pick");
        self.handle.play(self.item(pick.song_query.clone()))?;
        Ok(format!("dj picked {}", pick.song_query))
    }

    fn item(&self, query: String) -> QueueItem {
        QueueItem::user(Playable::search(query), self.requester.clone())
    }

    /// Run one command and return the text to show.
    pub async fn execute(&self, cmd: ConsoleCommand) -> Result<String> {
        let reply = match cmd {
            ConsoleCommand::Play(query) => {
                self.handle.play(self.item(query.clone()))?;
                format!("playing {query}")
            }
            ConsoleCommand::Add(query) => {
                self.handle.enqueue(self.item(query.clone()))?;
                format!("queued {query}")
            }
            ConsoleCommand::Playlist(url) => {
                let added = self
                    .handle
                    .enqueue_playlist(url, self.requester.clone())
                    .await??;
                format!("queued {added} playlist entries")
            }
            ConsoleCommand::Dj(mood) => self.dj(mood).await?,
            ConsoleCommand::Skip => {
                self.handle.skip()?;
                "skipped".to_string()
            }
            ConsoleCommand::Stop => {
                self.handle.stop()?;
                "stopped".to_string()
            }
            ConsoleCommand::Pause => {
                self.handle.pause_toggle()?;
                "pause toggled".to_string()
            }
            ConsoleCommand::Radio(mode) => {
                let text = format!("radio {mode}");
                self.handle.set_radio_mode(mode)?;
                text
            }
            ConsoleCommand::Announcer(mode) => {
                self.handle.set_announcer_mode(mode)?;
                format!("announcer {mode:?}")
            }
            ConsoleCommand::Next => match self.handle.peek_next().await? {
                Some(next) => format!("next: {next}"),
                None => "nothing queued".to_string(),
            },
            ConsoleCommand::Queue => render_queue(&self.handle.snapshot().await?),
            ConsoleCommand::Status => render_status(&self.handle.snapshot().await?),
            ConsoleCommand::ResetRadio => {
                let removed = self.history.reset(self.handle.channel()).await?;
                format!("forgot {removed} plays")
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => "bye".to_string(),
        };
        Ok(reply)
    }
}

/// One-off pick request: no intro, recent plays avoided.
fn dj_request(mood: String, history: Vec<String>, recent: usize) -> PickRequest {
    let recent = history[..recent.min(history.len())].to_vec();
    PickRequest {
        recent,
        avoid: history,
        mood: Some(mood),
        session_start: false,
        speak_intro: false,
    }
}

fn render_status(snapshot: &SessionSnapshot) -> String {
    let playing = match snapshot.now_playing.as_ref() {
        Some(now) => match now.requester.as_deref() {
            Some(requester) => format!("{} (requested by {requester})", now.title),
            None if now.is_radio_pick => format!("{} (radio pick)", now.title),
            None => now.title.clone(),
        },
        None => "nothing".to_string(),
    };
    format!(
        "[{}] {:?}: {playing}\nradio {} | announcer {:?} | {} queued{}",
        snapshot.channel_id,
        snapshot.state,
        snapshot.radio_mode,
        snapshot.announcer_mode,
        snapshot.queue.len(),
        if snapshot.prefetch_in_flight {
            " | generating"
        } else {
            ""
        },
    )
}

fn render_queue(snapshot: &SessionSnapshot) -> String {
    if snapshot.queue.is_empty() {
        return "queue is empty".to_string();
    }
    snapshot
        .queue
        .iter()
        .enumerate()
        .map(|(pos, entry)| {
            let from = match entry.origin.as_ref().and_then(|o| o.requester()) {
                Some(requester) => format!(" <{requester}>"),
                None if entry.origin.as_ref().is_some_and(|o| o.is_radio()) => {
                    " <radio>".to_string()
                }
                None => String::new(),
            };
            format!("{:>2}. [{:?}] {}{from}", pos + 1, entry.kind, entry.label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
