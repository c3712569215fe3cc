//! Configuration loading and parsing.
//!
//! Defines the hub config schema and resolves defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use radio_core::SchedulerSettings;
use serde::Deserialize;

const DEFAULT_CHANNEL: &str = "main";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GENERATOR_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_TTS_VOICE: &str = "es-MX-DaliaNeural";

/// Top-level hub configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct HubConfig {
    /// Channel the console controls.
    pub channel: Option<String>,
    /// Scheduler tuning.
    pub scheduler: Option<SchedulerSettings>,
    /// yt-dlp search settings.
    pub search: Option<SearchConfig>,
    /// Text generator used for radio picks.
    pub generator: Option<GeneratorConfig>,
    /// Intro speech synthesis. Intros stay text-only when absent.
    pub tts: Option<TtsConfig>,
    /// Play history database.
    pub history: Option<HistoryConfig>,
    /// Audio output.
    pub player: Option<PlayerConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchConfig {
    /// yt-dlp executable (defaults to `yt-dlp` on PATH).
    pub ytdlp_path: Option<String>,
    /// yt-dlp format selector (default: `bestaudio/best`).
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeneratorConfig {
    /// API key. Prefer `api_key_env` for anything checked in.
    pub api_key: Option<String>,
    /// Environment variable holding the API key (default: `GEMINI_API_KEY`).
    pub api_key_env: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// API base URL override.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: Option<u64>,
    /// DJ persona used in prompts.
    pub persona: Option<String>,
    /// Language the DJ speaks.
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TtsConfig {
    /// Synthesizer executable (edge-tts compatible CLI).
    pub command: Option<String>,
    pub voice: Option<String>,
    /// Speaking rate, e.g. `+10%`.
    pub rate: Option<String>,
    /// Pitch shift, e.g. `+5Hz`.
    pub pitch: Option<String>,
    /// Directory for synthesized intros (default: system temp dir).
    pub output_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryConfig {
    /// SQLite file path (default: `radio-history.sqlite`).
    pub db_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerConfig {
    /// ffplay executable (defaults to `ffplay` on PATH).
    pub ffplay_path: Option<String>,
    /// Playback volume 0-100.
    pub volume: Option<u8>,
}

/// Resolved generator settings.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    pub persona: String,
    pub language: String,
}

/// Resolved synthesizer settings.
#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub command: PathBuf,
    pub voice: String,
    pub rate: Option<String>,
    pub pitch: Option<String>,
    pub output_dir: PathBuf,
}

impl HubConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<HubConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Channel id from config, or the default.
pub fn channel_from_config(cfg: &HubConfig) -> String {
    non_empty(cfg.channel.as_deref()).unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
}

pub fn scheduler_settings_from_config(cfg: &HubConfig) -> SchedulerSettings {
    cfg.scheduler.clone().unwrap_or_default()
}

pub fn ytdlp_path_from_config(cfg: &HubConfig) -> PathBuf {
    cfg.search
        .as_ref()
        .and_then(|search| non_empty(search.ytdlp_path.as_deref()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("yt-dlp"))
}

pub fn ytdlp_format_from_config(cfg: &HubConfig) -> String {
    cfg.search
        .as_ref()
        .and_then(|search| non_empty(search.format.as_deref()))
        .unwrap_or_else(|| "bestaudio/best".to_string())
}

/// Resolve generator settings. The API key comes from config or the environment.
pub fn generator_from_config(
    cfg: &HubConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GeneratorSettings> {
    let default = GeneratorConfig::default();
    let generator = cfg.generator.as_ref().unwrap_or(&default);
    let key_env = non_empty(generator.api_key_env.as_deref())
        .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
    let api_key = non_empty(generator.api_key.as_deref())
        .or_else(|| env(&key_env).and_then(|value| non_empty(Some(&value))))
        .ok_or_else(|| {
            anyhow::anyhow!("generator api key missing; set generator.api_key or ${key_env}")
        })?;
    Ok(GeneratorSettings {
        api_key,
        model: non_empty(generator.model.as_deref()).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        base_url: non_empty(generator.base_url.as_deref())
            .unwrap_or_else(|| DEFAULT_GENERATOR_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        temperature: generator.temperature,
        timeout: Duration::from_secs(generator.timeout_secs.unwrap_or(30).max(1)),
        persona: non_empty(generator.persona.as_deref())
            .unwrap_or_else(|| "Asuka, a sarcastic but helpful radio DJ".to_string()),
        language: non_empty(generator.language.as_deref())
            .unwrap_or_else(|| "Spanish".to_string()),
    })
}

/// Synthesizer settings, or `None` when speech is not configured.
pub fn tts_from_config(cfg: &HubConfig) -> Option<TtsSettings> {
    let tts = cfg.tts.as_ref()?;
    Some(TtsSettings {
        command: non_empty(tts.command.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("edge-tts")),
        voice: non_empty(tts.voice.as_deref()).unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
        rate: non_empty(tts.rate.as_deref()),
        pitch: non_empty(tts.pitch.as_deref()),
        output_dir: non_empty(tts.output_dir.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("radio-hub")),
    })
}

pub fn history_db_path_from_config(cfg: &HubConfig) -> PathBuf {
    cfg.history
        .as_ref()
        .and_then(|history| non_empty(history.db_path.as_deref()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("radio-history.sqlite"))
}

pub fn ffplay_path_from_config(cfg: &HubConfig) -> PathBuf {
    cfg.player
        .as_ref()
        .and_then(|player| non_empty(player.ffplay_path.as_deref()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ffplay"))
}

pub fn volume_from_config(cfg: &HubConfig) -> Option<u8> {
    cfg.player
        .as_ref()
        .and_then(|player| player.volume)
        .map(|volume| volume.min(100))
}
