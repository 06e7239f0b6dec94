//! Stream download client.
//!
//! Downloads go through yt-dlp: one `--dump-single-json` call to learn the
//! title and tags, and one download of the best progressive mp4 stream into
//! an explicit destination file.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

/// Format selector for the highest-resolution stream that already carries
/// audio and video in one mp4.
const BEST_PROGRESSIVE_FORMAT: &str = "best[ext=mp4]/best";

/// What the pipeline needs to know about a stream before downloading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub title: String,
    pub keywords: Vec<String>,
}

pub trait StreamDownloader: Send + Sync {
    fn fetch_info(&self, url: &str) -> Result<StreamInfo>;

    /// Saves the highest-resolution stream of `url` to `destination`.
    fn download_best(&self, url: &str, destination: &Path) -> Result<()>;
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Subset of yt-dlp's info JSON.
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    fulltitle: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl RawInfo {
    fn into_stream_info(self, url: &str) -> StreamInfo {
        let title = self
            .title
            .or(self.fulltitle)
            .filter(|t| !t.trim().is_empty())
            .or(self.id)
            .unwrap_or_else(|| url.to_owned());
        StreamInfo {
            title,
            keywords: self.tags.unwrap_or_default(),
        }
    }
}

/// [`StreamDownloader`] that drives the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    cookies: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::with_program("yt-dlp")
    }
}

impl YtDlp {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies: None,
        }
    }

    /// Passes `--cookies` on every call when the file exists.
    pub fn with_cookies(mut self, cookies: impl Into<PathBuf>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(cookies) = &self.cookies
            && cookies.exists()
        {
            command.arg("--cookies").arg(cookies);
        }
        command
    }
}

impl StreamDownloader for YtDlp {
    fn fetch_info(&self, url: &str) -> Result<StreamInfo> {
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("fetching metadata for {url}"))?;

        if !output.status.success() {
            bail!(
                "metadata command failed for {} (status {})",
                url,
                output.status
            );
        }

        let raw: RawInfo =
            serde_json::from_slice(&output.stdout).context("deserializing metadata JSON")?;
        Ok(raw.into_stream_info(url))
    }

    fn download_best(&self, url: &str, destination: &Path) -> Result<()> {
        debug!("downloading {} to {}", url, destination.display());
        let status = self
            .command()
            .arg("--format")
            .arg(BEST_PROGRESSIVE_FORMAT)
            .arg("--output")
            .arg(destination)
            .arg("--no-playlist")
            .arg("--force-overwrites")
            .arg("--no-warnings")
            .arg(url)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("running yt-dlp for {url}"))?;

        if !status.success() {
            bail!("download failed for {} (status {})", url, status);
        }
        if !destination.is_file() {
            bail!(
                "yt-dlp finished but {} was not written",
                destination.display()
            );
        }
        Ok(())
    }
}
