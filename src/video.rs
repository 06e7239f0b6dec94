//! One fetched channel video and the operations that act on it.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::PipelineError;
use crate::fsutil::{MAIN_VIDEO_FILE, list_part_files};
use crate::youtube::{ChannelGrabber, SearchItem};

/// Metadata of a channel video as listed by the search API. `keywords` stays
/// `None` until the video has been downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub keywords: Option<Vec<String>>,
}

impl VideoMetadata {
    pub fn from_search_item(item: &SearchItem) -> Result<Self> {
        let video_id = item
            .id
            .video_id
            .clone()
            .with_context(|| format!("search result {:?} has no videoId", item.snippet.title))?;
        Ok(Self {
            video_id,
            title: item.snippet.title.clone(),
            description: item.snippet.description.clone(),
            channel_id: item.snippet.channel_id.clone(),
            keywords: None,
        })
    }
}

/// Binds a [`VideoMetadata`] to the grabber that can download and split it.
pub struct YoutubeVideo<'g> {
    grabber: &'g ChannelGrabber,
    metadata: VideoMetadata,
    directory_title: String,
    split_videos: Option<Vec<PathBuf>>,
}

impl<'g> YoutubeVideo<'g> {
    pub fn new(grabber: &'g ChannelGrabber, metadata: VideoMetadata) -> Self {
        let directory_title = metadata.title.clone();
        Self {
            grabber,
            metadata,
            directory_title,
            split_videos: None,
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn keywords(&self) -> Option<&[String]> {
        self.metadata.keywords.as_deref()
    }

    pub fn split_videos(&self) -> Option<&[PathBuf]> {
        self.split_videos.as_deref()
    }

    /// `data/<channel>/videos/<title>`.
    pub fn directory(&self) -> PathBuf {
        self.grabber.video_directory(&self.directory_title)
    }

    pub fn video_path(&self) -> PathBuf {
        self.directory().join(MAIN_VIDEO_FILE)
    }

    /// Downloads the video and records its keywords.
    pub fn download(&mut self) -> Result<PathBuf> {
        let downloaded = self.grabber.download_video(&self.metadata.video_id)?;
        self.metadata.keywords = Some(downloaded.keywords);
        // The stream title can differ from the search title (HTML entities,
        // later renames); the files live under the stream title.
        self.directory_title = downloaded.title;
        Ok(downloaded.path)
    }

    /// Splits the downloaded video into one-minute chunks.
    pub fn split(&mut self) -> Result<&[PathBuf]> {
        let parts = self.grabber.split_video(&self.directory_title)?;
        let parts = self.split_videos.insert(parts);
        Ok(parts.as_slice())
    }

    /// Chunk files currently on disk.
    pub fn video_splits(&self) -> Result<Vec<PathBuf>> {
        let directory = self.directory();
        if !directory.exists() {
            return Err(PipelineError::VideoNotDownloaded { directory }.into());
        }
        list_part_files(&directory)
    }

    pub fn is_downloaded(&self) -> bool {
        self.video_path().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDownloader, FakeMedia, FakeSearchApi, search_item};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn channel(root: &Path, downloader: Arc<FakeDownloader>) -> Result<ChannelGrabber> {
        ChannelGrabber::new(
            "SamONellaAcademy",
            root,
            Box::new(Arc::new(FakeSearchApi::new("UCsam"))),
            downloader,
            Arc::new(FakeMedia::with_duration(200.0)),
        )
    }

    #[test]
    fn metadata_requires_video_id() {
        let mut item = search_item("v1", "Title");
        let meta = VideoMetadata::from_search_item(&item).unwrap();
        assert_eq!(meta.video_id, "v1");
        assert_eq!(meta.channel_id, "UCsam");
        assert!(meta.keywords.is_none());

        item.id.video_id = None;
        assert!(VideoMetadata::from_search_item(&item).is_err());
    }

    #[test]
    fn splits_require_download() -> Result<()> {
        let dir = tempdir()?;
        let grabber = channel(dir.path(), Arc::new(FakeDownloader::default()))?;
        let video = YoutubeVideo::new(
            &grabber,
            VideoMetadata::from_search_item(&search_item("v1", "Missing"))?,
        );
        let err = video.video_splits().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::VideoNotDownloaded { .. })
        ));
        Ok(())
    }

    #[test]
    fn download_and_split_follow_stream_title() -> Result<()> {
        let dir = tempdir()?;
        let downloader = Arc::new(FakeDownloader::with_title("Why Cats Purr", &["cats"]));
        let grabber = channel(dir.path(), downloader)?;
        let mut video = YoutubeVideo::new(
            &grabber,
            VideoMetadata::from_search_item(&search_item("v1", "Why Cats Purr &amp; Hiss"))?,
        );

        let path = video.download()?;
        assert!(path.ends_with("videos/Why Cats Purr/main.mp4"));
        assert!(video.is_downloaded());
        assert_eq!(video.keywords(), Some(&["cats".to_string()][..]));

        assert_eq!(video.split()?.len(), 3);
        assert_eq!(video.split_videos().map(<[PathBuf]>::len), Some(3));
        assert_eq!(video.video_splits()?.len(), 3);
        assert_eq!(video.title(), "Why Cats Purr &amp; Hiss");
        Ok(())
    }
}
