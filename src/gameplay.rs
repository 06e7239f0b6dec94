//! Gameplay footage: one long video downloaded once into
//! `data/Gameplay/<title>/` and split into chunks that get paired with the
//! channel videos.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::download::StreamDownloader;
use crate::error::PipelineError;
use crate::fsutil::{
    MAIN_VIDEO_FILE, ensure_directory, list_part_files, part_file_name, sanitize_component,
};
use crate::media::MediaTool;
use crate::segment::split_into_chunks;

pub const GAMEPLAY_SUBDIR: &str = "Gameplay";

pub struct GameplayGrabber {
    url: String,
    title: String,
    video_directory: PathBuf,
    already_downloaded: bool,
    downloader: Arc<dyn StreamDownloader>,
    media: Arc<dyn MediaTool>,
    split_workers: usize,
}

impl GameplayGrabber {
    /// Looks up the title of `url` to locate its directory. A directory that
    /// already exists marks the gameplay as downloaded.
    pub fn new(
        url: impl Into<String>,
        data_root: &Path,
        downloader: Arc<dyn StreamDownloader>,
        media: Arc<dyn MediaTool>,
    ) -> Result<Self> {
        let url = url.into();
        let stream = downloader
            .fetch_info(&url)
            .with_context(|| format!("looking up gameplay {url}"))?;
        let video_directory = data_root
            .join(GAMEPLAY_SUBDIR)
            .join(sanitize_component(&stream.title));
        let already_downloaded = video_directory.exists();

        Ok(Self {
            url,
            title: stream.title,
            video_directory,
            already_downloaded,
            downloader,
            media,
            split_workers: 1,
        })
    }

    pub fn with_split_workers(mut self, workers: usize) -> Self {
        self.split_workers = workers.max(1);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn video_directory(&self) -> &Path {
        &self.video_directory
    }

    pub fn is_downloaded(&self) -> bool {
        self.already_downloaded
    }

    /// Downloads and splits the gameplay unless that already happened, then
    /// returns the chunks on disk.
    pub fn download(&mut self) -> Result<Vec<PathBuf>> {
        if self.already_downloaded {
            info!("{} already exists", self.title);
            return self.clips();
        }

        ensure_directory(&self.video_directory)?;
        let video_path = self.video_directory.join(MAIN_VIDEO_FILE);
        info!("Downloading gameplay {}", self.title);
        self.downloader
            .download_best(&self.url, &video_path)
            .with_context(|| format!("downloading gameplay {}", self.title))?;
        self.already_downloaded = true;

        split_into_chunks(
            self.media.as_ref(),
            &video_path,
            &self.video_directory,
            self.split_workers,
        )?;
        self.clips()
    }

    /// Chunk files on disk.
    pub fn clips(&self) -> Result<Vec<PathBuf>> {
        if !self.already_downloaded {
            return Err(PipelineError::GameplayNotDownloaded.into());
        }
        list_part_files(&self.video_directory)
    }

    /// Path of chunk `index`. Existence is not checked.
    pub fn clip(&self, index: usize) -> PathBuf {
        self.video_directory.join(part_file_name(index))
    }
}
