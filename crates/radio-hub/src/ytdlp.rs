//! Search and URL resolution through the `yt-dlp` CLI.

use std::path::PathBuf;

use async_trait::async_trait;
use radio_core::{PlaylistEntry, SearchError, SearchResolver, TrackInfo};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Subset of yt-dlp's `--dump-single-json` output we use.
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<InfoJson>>,
}

pub struct YtDlpSearch {
    program: PathBuf,
    format: String,
}

impl YtDlpSearch {
    pub fn new(program: PathBuf, format: String) -> Self {
        Self { program, format }
    }

    async fn dump_json(&self, args: &[&str]) -> Result<InfoJson, SearchError> {
        debug!(program = %self.program.display(), args = ?args, "running yt-dlp");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| SearchError::Backend(format!("spawn yt-dlp: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SearchError::Backend(
                stderr.lines().last().unwrap_or("yt-dlp failed").to_string(),
            ));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| SearchError::Backend(format!("parse yt-dlp output: {err}")))
    }
}

/// Plain text becomes a single-result YouTube search.
fn search_target(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("ytsearch1:{trimmed}")
    }
}

fn first_track(info: InfoJson, query: &str) -> Result<TrackInfo, SearchError> {
    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::NotFound(query.to_string()))?,
        None => info,
    };
    let locator = info
        .url
        .ok_or_else(|| SearchError::Backend(format!("no stream url for {query:?}")))?;
    Ok(TrackInfo {
        title: info.title.unwrap_or_else(|| query.to_string()),
        locator,
        duration_seconds: info
            .duration
            .filter(|seconds| *seconds > 0.0)
            .map(|seconds| seconds.round() as u64),
    })
}

fn playlist_entries(info: InfoJson) -> Vec<PlaylistEntry> {
    info.entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let locator = entry.webpage_url.or(entry.url);
            let title = entry.title.or_else(|| locator.clone())?;
            Some(PlaylistEntry { title, locator })
        })
        .collect()
}

#[async_trait]
impl SearchResolver for YtDlpSearch {
    async fn resolve(&self, query: &str) -> Result<TrackInfo, SearchError> {
        let target = search_target(query);
        let info = self
            .dump_json(&[
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                self.format.as_str(),
                target.as_str(),
            ])
            .await?;
        first_track(info, query)
    }

    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistEntry>, SearchError> {
        let info = self
            .dump_json(&["--dump-single-json", "--flat-playlist", "--no-warnings", url])
            .await?;
        let entries = playlist_entries(info);
        if entries.is_empty() {
            return Err(SearchError::NotFound(url.to_string()));
        }
        Ok(entries)
    }
}
