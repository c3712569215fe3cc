//! Hub startup and console loop.
//!
//! Wires the collaborators into a channel registry, connects the configured
//! channel to the local player and reads commands from stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use radio_core::{ChannelRegistry, Collaborators, ContentGenerator};
use radio_types::{ChannelEvent, ChannelEventKind, ChannelId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{self, HubConfig};
use crate::console::{Console, ConsoleCommand, HELP, parse_line};
use crate::ffplay::FfplayBackend;
use crate::generator::GeminiGenerator;
use crate::history_db::HistoryDb;
use crate::tts::Synthesizer;
use crate::ytdlp::YtDlpSearch;

/// Build the registry, connect the channel and run the console until quit.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let channel = ChannelId::new(
        args.channel
            .unwrap_or_else(|| config::channel_from_config(&cfg)),
    );
    let settings = config::scheduler_settings_from_config(&cfg);
    let db_path = config::history_db_path_from_config(&cfg);
    info!(
        channel = %channel,
        history = %db_path.display(),
        prefetch_manual = settings.prefetch_manual,
        prefetch_radio = settings.prefetch_radio,
        "starting radio-hub"
    );

    let search = YtDlpSearch::new(
        config::ytdlp_path_from_config(&cfg),
        config::ytdlp_format_from_config(&cfg),
    );
    let synthesizer = config::tts_from_config(&cfg).map(|tts| {
        info!(voice = %tts.voice, dir = %tts.output_dir.display(), "intro speech enabled");
        Synthesizer::new(tts)
    });
    if synthesizer.is_none() {
        info!("intro speech disabled (no [tts] section); intros stay text-only");
    }
    let generator_settings = config::generator_from_config(&cfg, |name| std::env::var(name).ok())?;
    info!(model = %generator_settings.model, "content generator configured");
    let generator: Arc<dyn ContentGenerator> = Arc::new(
        GeminiGenerator::new(generator_settings, synthesizer).context("build content generator")?,
    );
    let history = HistoryDb::open(&db_path)?;

    let registry = ChannelRegistry::new(
        Collaborators {
            search: Arc::new(search),
            generator: generator.clone(),
            history: Arc::new(history.clone()),
        },
        settings.clone(),
    );
    spawn_event_logger(registry.events().subscribe());

    let backend = Arc::new(FfplayBackend::spawn(
        config::ffplay_path_from_config(&cfg),
        config::volume_from_config(&cfg),
    ));
    let handle = registry.connect(channel, backend);
    let console = Console::new(handle, history, generator, &settings, args.requester);

    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel();
    setup_shutdown(quit_tx);

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = quit_rx.recv() => break,
            line = lines.next_line() => line.context("read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(cmd)) => match console.execute(cmd).await {
                Ok(reply) => println!("{reply}"),
                Err(err) => println!("error: {err:#}"),
            },
            Err(err) => println!("{err:#}"),
        }
    }

    info!("shutting down");
    registry.shutdown().await;
    Ok(())
}

/// Explicit `--config`, else `config.toml` next to the executable, else defaults.
fn load_config(path: Option<&PathBuf>) -> Result<HubConfig> {
    if let Some(path) = path {
        return HubConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "using config next to executable");
            HubConfig::load(&path)
        }
        _ => {
            info!("no config file; using defaults");
            Ok(HubConfig::default())
        }
    }
}

/// Log channel events and echo the user-facing ones to the console.
fn spawn_event_logger(mut events: broadcast::Receiver<ChannelEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => show_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn show_event(event: &ChannelEvent) {
    let channel = &event.channel_id;
    match &event.kind {
        ChannelEventKind::NowPlaying(now) => {
            info!(channel = %channel, title = %now.title, radio = now.is_radio_pick, "now playing");
            println!("[{channel}] now playing: {}", now.title);
        }
        ChannelEventKind::Announcement { text } => println!("[{channel}] {text}"),
        ChannelEventKind::RadioFailed { reason } => {
            warn!(channel = %channel, reason = %reason, "radio failed");
            println!("[{channel}] radio could not find a song: {reason}");
        }
        ChannelEventKind::Idle => info!(channel = %channel, "channel idle"),
        ChannelEventKind::QueueChanged => debug!(channel = %channel, "queue changed"),
    }
}

/// Install Ctrl+C handler that ends the console loop.
fn setup_shutdown(quit_tx: mpsc::UnboundedSender<()>) {
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = quit_tx.send(());
    }) {
        warn!(error = %err, "could not install ctrl-c handler");
    }
}
