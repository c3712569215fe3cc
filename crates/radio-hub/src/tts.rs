//! Intro speech synthesis through an edge-tts compatible command.

use std::path::PathBuf;

use radio_core::GeneratorError;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::config::TtsSettings;

pub struct Synthesizer {
    settings: TtsSettings,
}

impl Synthesizer {
    pub fn new(settings: TtsSettings) -> Self {
        Self { settings }
    }

    fn next_path(&self) -> PathBuf {
        self.settings
            .output_dir
            .join(format!("intro-{}.mp3", Uuid::new_v4()))
    }

    fn args(&self, text: &str, path: &std::path::Path) -> Vec<String> {
        let mut args = vec!["--voice".to_string(), self.settings.voice.clone()];
        if let Some(rate) = self.settings.rate.as_ref() {
            args.push(format!("--rate={rate}"));
        }
        if let Some(pitch) = self.settings.pitch.as_ref() {
            args.push(format!("--pitch={pitch}"));
        }
        args.push("--text".to_string());
        args.push(text.to_string());
        args.push("--write-media".to_string());
        args.push(path.to_string_lossy().into_owned());
        args
    }

    /// Write `text` to a fresh audio file and return its path.
    pub async fn synthesize(&self, text: &str) -> Result<PathBuf, GeneratorError> {
        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|err| GeneratorError::Synthesis(format!("create output dir: {err}")))?;
        let path = self.next_path();
        debug!(path = %path.display(), "synthesizing intro");
        let output = Command::new(&self.settings.command)
            .args(self.args(text, &path))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| GeneratorError::Synthesis(format!("spawn synthesizer: {err}")))?;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&path).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeneratorError::Synthesis(
                stderr.lines().last().unwrap_or("synthesizer failed").to_string(),
            ));
        }
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(GeneratorError::Synthesis(
                "synthesizer wrote no audio".to_string(),
            ));
        }
        Ok(path)
    }
}
