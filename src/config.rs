use anyhow::{Context, Result, anyhow, bail};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::compose::DEFAULT_RENDER_THREADS;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TARGET_CHANNEL: &str = "SamONellaAcademy";
pub const DEFAULT_GAMEPLAY_URL: &str = "https://www.youtube.com/watch?v=n_Dv4JMiwK8";
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_OUTPUT_ROOT: &str = "output";
pub const DEFAULT_GAMEPLAY_START_INDEX: usize = 1;
pub const DEFAULT_SPLIT_WORKERS: usize = 1;

const KNOWN_KEYS: &[&str] = &[
    "GOOGLE_API_KEY",
    "TARGET_CHANNEL",
    "GAMEPLAY_URLS",
    "DATA_ROOT",
    "OUTPUT_ROOT",
    "INCLUDE_GAMEPLAY_OVERLAY",
    "GAMEPLAY_START_INDEX",
    "SPLIT_WORKERS",
    "RENDER_THREADS",
    "TITLE_FONT_FILE",
];

/// Values found in the env file and the process environment. Everything is
/// optional here; [`Settings`] applies defaults.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub google_api_key: Option<String>,
    pub target_channel: Option<String>,
    pub gameplay_urls: Vec<String>,
    pub data_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub include_gameplay_overlay: Option<bool>,
    pub gameplay_start_index: Option<usize>,
    pub split_workers: Option<usize>,
    pub render_threads: Option<usize>,
    pub title_font_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub target_channel: String,
    pub gameplay_url: String,
    pub data_root: PathBuf,
    pub output_root: PathBuf,
    pub include_gameplay_overlay: bool,
    pub gameplay_start_index: usize,
    pub split_workers: usize,
    pub render_threads: usize,
    /// Font used both to measure and to draw the overlay text.
    pub title_font_file: Option<PathBuf>,
}

fn parse_bool(key: &str, value: &str, origin: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean in {origin}, got {value:?}"),
    }
}

fn parse_count(key: &str, value: &str, origin: &str) -> Result<usize> {
    value
        .parse()
        .with_context(|| format!("Parsing {key} from {origin}"))
}

impl EnvConfig {
    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        match key {
            "GOOGLE_API_KEY" => {
                if !value.is_empty() {
                    self.google_api_key = Some(value.to_string());
                }
            }
            "TARGET_CHANNEL" => {
                if !value.is_empty() {
                    self.target_channel = Some(value.to_string());
                }
            }
            "GAMEPLAY_URLS" => {
                self.gameplay_urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "DATA_ROOT" => self.data_root = Some(PathBuf::from(value)),
            "OUTPUT_ROOT" => self.output_root = Some(PathBuf::from(value)),
            "INCLUDE_GAMEPLAY_OVERLAY" => {
                self.include_gameplay_overlay = Some(parse_bool(key, value, origin)?);
            }
            "GAMEPLAY_START_INDEX" => {
                self.gameplay_start_index = Some(parse_count(key, value, origin)?);
            }
            "SPLIT_WORKERS" => self.split_workers = Some(parse_count(key, value, origin)?),
            "RENDER_THREADS" => self.render_threads = Some(parse_count(key, value, origin)?),
            "TITLE_FONT_FILE" => {
                self.title_font_file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            _ => {}
        }
        Ok(())
    }

    /// Overrides file values with any of the known keys set in `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KNOWN_KEYS {
            if let Some(value) = lookup(key) {
                self.apply(key, value.trim(), "the environment")?;
            }
        }
        Ok(())
    }

    pub fn into_settings(self) -> Result<Settings> {
        let api_key = self
            .google_api_key
            .ok_or_else(|| anyhow!("GOOGLE_API_KEY is not set"))?;
        Ok(Settings {
            api_key,
            target_channel: self
                .target_channel
                .unwrap_or_else(|| DEFAULT_TARGET_CHANNEL.to_string()),
            gameplay_url: self
                .gameplay_urls
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_GAMEPLAY_URL.to_string()),
            data_root: self
                .data_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT)),
            output_root: self
                .output_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
            include_gameplay_overlay: self.include_gameplay_overlay.unwrap_or(true),
            gameplay_start_index: self
                .gameplay_start_index
                .unwrap_or(DEFAULT_GAMEPLAY_START_INDEX),
            split_workers: self.split_workers.unwrap_or(DEFAULT_SPLIT_WORKERS).max(1),
            render_threads: self.render_threads.unwrap_or(DEFAULT_RENDER_THREADS).max(1),
            title_font_file: self.title_font_file,
        })
    }
}

/// Parses a `KEY=VALUE` env file. A missing file is not an error.
pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"').trim_matches('\'');
            cfg.apply(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(Path::new(DEFAULT_ENV_PATH))
}

pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    load_settings_with(path, |key| env::var(key).ok())
}

/// Env file first, then `lookup` on top of it.
pub fn load_settings_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    cfg.apply_overrides(lookup)?;
    cfg.into_settings()
        .with_context(|| format!("Loading settings (env file {})", path.display()))
}
