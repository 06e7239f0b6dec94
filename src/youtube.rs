//! Channel lookups against the YouTube Data API and the per-channel cache
//! under `data/<channel>/`.
//!
//! Layout owned by this module:
//!
//! ```text
//! data/<channel>/channelId.json          {"channelId": "..."}
//! data/<channel>/fetchedVideos.json      {"<channel>": [search items]}
//! data/<channel>/videos/<title>/main.mp4
//! data/<channel>/videos/<title>/part-<i>.mp4
//! ```
//!
//! Both JSON files are written once and then trusted forever; delete them to
//! force a refresh.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::download::{StreamDownloader, watch_url};
use crate::error::PipelineError;
use crate::fsutil::{
    MAIN_VIDEO_FILE, ensure_directory, list_part_files, sanitize_component, write_json_pretty,
};
use crate::media::MediaTool;
use crate::segment::split_into_chunks;

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const PAGE_SIZE: u32 = 50;

const CHANNEL_ID_FILE: &str = "channelId.json";
const FETCHED_VIDEOS_FILE: &str = "fetchedVideos.json";
const VIDEOS_SUBDIR: &str = "videos";

/// One entry of a `search.list` response. Fields the pipeline does not read
/// are kept in `extra` so the cache round-trips the API payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: ItemId,
    pub snippet: Snippet,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<SearchItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelIdRecord {
    channel_id: String,
}

/// The two `search.list` queries the grabber issues.
pub trait VideoSearchApi {
    /// `type=channel` search for `query`.
    fn search_channels(&self, query: &str) -> Result<SearchPage>;

    /// One page (up to [`PAGE_SIZE`]) of `type=video` results for a channel.
    fn search_channel_videos(&self, channel_id: &str, page_token: Option<&str>)
    -> Result<SearchPage>;
}

impl<T: VideoSearchApi + ?Sized> VideoSearchApi for Arc<T> {
    fn search_channels(&self, query: &str) -> Result<SearchPage> {
        (**self).search_channels(query)
    }

    fn search_channel_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage> {
        (**self).search_channel_videos(channel_id, page_token)
    }
}

/// Blocking client for the Data API v3 `search` endpoint.
pub struct DataApiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl DataApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, YOUTUBE_API_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn search(&self, params: &[(&str, &str)]) -> Result<SearchPage> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let mut request = self.agent.get(&url).query("key", &self.api_key);
        for (key, value) in params {
            request = request.query(key, value);
        }

        // The request URL carries the API key, so errors are rebuilt without it.
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                bail!("{url} returned HTTP {code}: {}", body.trim());
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(anyhow!("{url} could not be reached: {}", transport.kind()));
            }
        };

        response
            .into_json::<SearchPage>()
            .with_context(|| format!("decoding search response from {url}"))
    }
}

impl VideoSearchApi for DataApiClient {
    fn search_channels(&self, query: &str) -> Result<SearchPage> {
        self.search(&[("part", "snippet"), ("q", query), ("type", "channel")])
    }

    fn search_channel_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage> {
        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![
            ("part", "snippet"),
            ("channelId", channel_id),
            ("maxResults", page_size.as_str()),
            ("type", "video"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.search(&params)
    }
}

/// Result of [`ChannelGrabber::download_video`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedVideo {
    pub path: PathBuf,
    /// Title reported by the download client; names the video directory.
    pub title: String,
    pub keywords: Vec<String>,
}

/// Fetches, caches, downloads and splits the videos of one channel.
pub struct ChannelGrabber {
    target_channel: String,
    directory: PathBuf,
    channel_id: String,
    api: Box<dyn VideoSearchApi>,
    downloader: Arc<dyn StreamDownloader>,
    media: Arc<dyn MediaTool>,
    split_workers: usize,
}

impl ChannelGrabber {
    /// Prepares `data_root/<channel>` and resolves the channel id, hitting the
    /// API only when no `channelId.json` is cached.
    pub fn new(
        target_channel: impl Into<String>,
        data_root: &Path,
        api: Box<dyn VideoSearchApi>,
        downloader: Arc<dyn StreamDownloader>,
        media: Arc<dyn MediaTool>,
    ) -> Result<Self> {
        let target_channel = target_channel.into();
        let directory = data_root.join(sanitize_component(&target_channel));
        ensure_directory(data_root)?;
        ensure_directory(&directory)?;

        let mut grabber = Self {
            target_channel,
            directory,
            channel_id: String::new(),
            api,
            downloader,
            media,
            split_workers: 1,
        };
        grabber.channel_id = grabber.resolve_channel_id()?;
        Ok(grabber)
    }

    pub fn with_split_workers(mut self, workers: usize) -> Self {
        self.split_workers = workers.max(1);
        self
    }

    pub fn target_channel(&self) -> &str {
        &self.target_channel
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `data/<channel>/videos/<title>`.
    pub fn video_directory(&self, title: &str) -> PathBuf {
        self.directory
            .join(VIDEOS_SUBDIR)
            .join(sanitize_component(title))
    }

    /// Returns the cached channel id or looks it up by name. The first search
    /// hit wins.
    pub fn resolve_channel_id(&self) -> Result<String> {
        let cache_path = self.directory.join(CHANNEL_ID_FILE);
        if cache_path.is_file() {
            let file = File::open(&cache_path)
                .with_context(|| format!("opening {}", cache_path.display()))?;
            let record: ChannelIdRecord = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", cache_path.display()))?;
            return Ok(record.channel_id);
        }

        let page = self
            .api
            .search_channels(&self.target_channel)
            .with_context(|| format!("searching for channel {}", self.target_channel))?;
        let (channel_id, channel_title) = page
            .items
            .into_iter()
            .find_map(|item| {
                let id = item
                    .id
                    .channel_id
                    .unwrap_or_else(|| item.snippet.channel_id.clone());
                (!id.is_empty()).then_some((id, item.snippet.title))
            })
            .ok_or_else(|| PipelineError::ChannelNotFound {
                query: self.target_channel.clone(),
            })?;
        info!("Found channel: {}", channel_title);

        write_json_pretty(
            &cache_path,
            &ChannelIdRecord {
                channel_id: channel_id.clone(),
            },
        )?;
        Ok(channel_id)
    }

    fn fetched_videos_path(&self) -> PathBuf {
        self.directory.join(FETCHED_VIDEOS_FILE)
    }

    fn load_saved_videos(&self) -> Result<BTreeMap<String, Vec<SearchItem>>> {
        let path = self.fetched_videos_path();
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))
    }

    fn save_videos(&self, videos: &[SearchItem]) -> Result<()> {
        let mut saved = self.load_saved_videos()?;
        saved.insert(self.target_channel.clone(), videos.to_vec());
        write_json_pretty(&self.fetched_videos_path(), &saved)
    }

    /// Every video the channel has published, in the order the API returned
    /// them. Served from `fetchedVideos.json` when present.
    pub fn list_videos(&self) -> Result<Vec<SearchItem>> {
        if let Some(videos) = self.load_saved_videos()?.remove(&self.target_channel) {
            return Ok(videos);
        }

        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .search_channel_videos(&self.channel_id, page_token.as_deref())
                .with_context(|| format!("listing videos of {}", self.channel_id))?;
            videos.extend(page.items);

            page_token = page.next_page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        info!("Found {} videos", videos.len());
        self.save_videos(&videos)?;
        Ok(videos)
    }

    /// Downloads `video_id` to `videos/<title>/main.mp4`. Always downloads;
    /// callers skip videos they already have.
    pub fn download_video(&self, video_id: &str) -> Result<DownloadedVideo> {
        let url = watch_url(video_id);
        let stream = self.downloader.fetch_info(&url)?;
        let video_directory = ensure_directory(self.video_directory(&stream.title))?;
        let path = video_directory.join(MAIN_VIDEO_FILE);

        info!("Downloading {}", stream.title);
        self.downloader
            .download_best(&url, &path)
            .with_context(|| format!("downloading {}", stream.title))?;
        info!("Downloaded {}", stream.title);

        Ok(DownloadedVideo {
            path,
            title: stream.title,
            keywords: stream.keywords,
        })
    }

    /// Splits `videos/<title>/main.mp4` and returns the chunk files on disk.
    pub fn split_video(&self, title: &str) -> Result<Vec<PathBuf>> {
        let video_directory = self.video_directory(title);
        if !video_directory.is_dir() {
            return Err(PipelineError::SplitBeforeDownload {
                directory: video_directory,
            }
            .into());
        }

        split_into_chunks(
            self.media.as_ref(),
            &video_directory.join(MAIN_VIDEO_FILE),
            &video_directory,
            self.split_workers,
        )?;
        list_part_files(&video_directory)
    }
}
