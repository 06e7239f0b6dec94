//! Small filesystem helpers shared by the grabbers and the composer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use walkdir::WalkDir;

pub const MAIN_VIDEO_FILE: &str = "main.mp4";
pub const VIDEO_EXTENSION: &str = "mp4";

/// Creates `path` and every missing parent. Existing directories are fine.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// File name of the chunk at `index`.
pub fn part_file_name(index: usize) -> String {
    format!("part-{index}.{VIDEO_EXTENSION}")
}

/// Lists the chunk files sitting directly inside `dir`: regular, non-hidden
/// files whose name contains `part` and whose extension is `mp4`. Results
/// are ordered by part index so callers can pair chunks positionally.
pub fn list_part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut parts = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let is_video = path.extension().is_some_and(|ext| ext == VIDEO_EXTENSION);
        if name.contains("part") && is_video {
            parts.push(path.to_path_buf());
        }
    }

    parts.sort_by(|a, b| part_sort_key(a).cmp(&part_sort_key(b)));
    Ok(parts)
}

fn part_sort_key(path: &Path) -> (usize, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let index = stem
        .strip_prefix("part-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    (index, stem)
}

/// Turns a video title into a single path component.
pub fn sanitize_component(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            _ => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    match trimmed {
        "" | "." | ".." => "untitled".to_owned(),
        other => other.to_owned(),
    }
}

/// Writes `value` as JSON indented with four spaces, the layout used by the
/// channel caches.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut serializer =
        Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .with_context(|| format!("serializing {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
