//! Fakes for the external collaborators plus a helper for shell stubs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use parking_lot::Mutex;
use serde_json::{Map, json};

use crate::download::{StreamDownloader, StreamInfo};
use crate::media::{MediaTool, RenderPlan};
use crate::segment::Timestamp;
use crate::youtube::{ItemId, SearchItem, SearchPage, Snippet, VideoSearchApi};

/// Writes an executable bash script named `name` into `dir`.
pub fn install_stub(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let script_path = dir.join(name);
    fs::write(&script_path, format!("#!/usr/bin/env bash\n{body}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;
    }
    Ok(script_path)
}

pub fn search_item(video_id: &str, title: &str) -> SearchItem {
    let mut extra = Map::new();
    extra.insert("kind".into(), json!("youtube#searchResult"));
    extra.insert("etag".into(), json!(format!("etag-{video_id}")));
    SearchItem {
        id: ItemId {
            kind: Some("youtube#video".into()),
            video_id: Some(video_id.into()),
            channel_id: None,
            extra: Map::new(),
        },
        snippet: Snippet {
            title: title.into(),
            description: format!("about {title}"),
            channel_id: "UCsam".into(),
            extra: Map::new(),
        },
        extra,
    }
}

/// In-memory media toolkit. Trims touch the output file; renders write
/// `output` unless configured to fail.
#[derive(Default)]
pub struct FakeMedia {
    default_duration: f64,
    clip_durations: HashMap<PathBuf, f64>,
    fail_trims: bool,
    fail_renders: bool,
    probes: Mutex<usize>,
    trims: Mutex<Vec<(PathBuf, Timestamp)>>,
    renders: Mutex<Vec<RenderPlan>>,
}

impl FakeMedia {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            default_duration: duration,
            ..Self::default()
        }
    }

    pub fn with_clip_duration(mut self, path: impl Into<PathBuf>, duration: f64) -> Self {
        self.clip_durations.insert(path.into(), duration);
        self
    }

    pub fn failing_trims(mut self) -> Self {
        self.fail_trims = true;
        self
    }

    pub fn failing_renders(mut self) -> Self {
        self.fail_renders = true;
        self
    }

    pub fn probes(&self) -> usize {
        *self.probes.lock()
    }

    pub fn trims(&self) -> Vec<(PathBuf, Timestamp)> {
        self.trims.lock().clone()
    }

    pub fn renders(&self) -> Vec<RenderPlan> {
        self.renders.lock().clone()
    }
}

impl MediaTool for FakeMedia {
    fn probe_duration(&self, input: &Path) -> Result<f64> {
        *self.probes.lock() += 1;
        Ok(self
            .clip_durations
            .get(input)
            .copied()
            .unwrap_or(self.default_duration))
    }

    fn trim(&self, _input: &Path, output: &Path, span: Timestamp) -> Result<()> {
        self.trims.lock().push((output.to_path_buf(), span));
        if self.fail_trims {
            bail!("trim failed");
        }
        fs::write(output, format!("{}-{}", span.start, span.end))?;
        Ok(())
    }

    fn render(&self, plan: &RenderPlan) -> Result<()> {
        self.renders.lock().push(plan.clone());
        if self.fail_renders {
            bail!("render failed");
        }
        fs::write(&plan.output, "rendered")?;
        Ok(())
    }
}

/// Download client that writes placeholder bytes and records every URL.
#[derive(Default)]
pub struct FakeDownloader {
    title: String,
    keywords: Vec<String>,
    downloads: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn with_title(title: &str, keywords: &[&str]) -> Self {
        Self {
            title: title.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().clone()
    }
}

impl StreamDownloader for FakeDownloader {
    fn fetch_info(&self, url: &str) -> Result<StreamInfo> {
        let title = if self.title.is_empty() {
            url.rsplit('=').next().unwrap_or(url).to_owned()
        } else {
            self.title.clone()
        };
        Ok(StreamInfo {
            title,
            keywords: self.keywords.clone(),
        })
    }

    fn download_best(&self, url: &str, destination: &Path) -> Result<()> {
        self.downloads.lock().push(url.to_owned());
        fs::write(destination, "video-bytes")?;
        Ok(())
    }
}

/// Search API serving one channel hit and a scripted list of video pages.
pub struct FakeSearchApi {
    channel_id: String,
    pages: Vec<(Vec<SearchItem>, Option<String>)>,
    channel_searches: Mutex<usize>,
    page_tokens: Mutex<Vec<Option<String>>>,
}

impl FakeSearchApi {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.into(),
            pages: Vec::new(),
            channel_searches: Mutex::new(0),
            page_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(mut self, pages: Vec<(Vec<SearchItem>, Option<&str>)>) -> Self {
        self.pages = pages
            .into_iter()
            .map(|(items, token)| (items, token.map(str::to_owned)))
            .collect();
        self
    }

    pub fn channel_searches(&self) -> usize {
        *self.channel_searches.lock()
    }

    pub fn page_tokens(&self) -> Vec<Option<String>> {
        self.page_tokens.lock().clone()
    }
}

impl VideoSearchApi for FakeSearchApi {
    fn search_channels(&self, query: &str) -> Result<SearchPage> {
        *self.channel_searches.lock() += 1;
        if self.channel_id.is_empty() {
            return Ok(SearchPage::default());
        }
        let item: SearchItem = serde_json::from_value(json!({
            "kind": "youtube#searchResult",
            "id": { "kind": "youtube#channel", "channelId": self.channel_id },
            "snippet": { "title": query, "channelId": self.channel_id }
        }))?;
        Ok(SearchPage {
            items: vec![item],
            next_page_token: None,
        })
    }

    fn search_channel_videos(
        &self,
        _channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage> {
        let mut tokens = self.page_tokens.lock();
        let index = tokens.len();
        tokens.push(page_token.map(str::to_owned));
        let Some((items, next)) = self.pages.get(index) else {
            return Ok(SearchPage::default());
        };
        Ok(SearchPage {
            items: items.clone(),
            next_page_token: next.clone(),
        })
    }
}
