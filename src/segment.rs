//! Splits a source video into one-minute chunks.
//!
//! Chunk boundaries are whole seconds. A final chunk shorter than a minute is
//! folded into the one before it, so every chunk except a lone short video
//! lasts at least sixty seconds. Chunk files are named by their position in
//! the merged list: `part-0.mp4`, `part-1.mp4`, ...

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::fsutil::part_file_name;
use crate::media::MediaTool;

pub const CHUNK_SECONDS: u64 = 60;

/// A `[start, end)` span in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub start: u64,
    pub end: u64,
}

impl Timestamp {
    pub fn span(&self) -> u64 {
        self.end - self.start
    }
}

/// Computes chunk boundaries for a video lasting `duration` seconds.
pub fn chunk_timestamps(duration: u64) -> Vec<Timestamp> {
    let chunks = duration.div_ceil(CHUNK_SECONDS);
    let mut timestamps: Vec<Timestamp> = (0..chunks)
        .map(|i| Timestamp {
            start: i * CHUNK_SECONDS,
            end: ((i + 1) * CHUNK_SECONDS).min(duration),
        })
        .collect();

    if timestamps.len() > 1
        && let Some(last) = timestamps.last().copied()
        && last.span() < CHUNK_SECONDS
    {
        timestamps.pop();
        if let Some(previous) = timestamps.last_mut() {
            previous.end = last.end;
        }
    }

    timestamps
}

/// Probes, chunks, and trims `input` into `output_dir`.
///
/// Chunk files that already exist are left alone. A failed trim is logged
/// and skipped; the returned list still names every expected chunk so the
/// caller sees the same positional layout either way.
pub fn split_into_chunks(
    tool: &dyn MediaTool,
    input: &Path,
    output_dir: &Path,
    workers: usize,
) -> Result<Vec<PathBuf>> {
    let duration = tool
        .probe_duration(input)
        .with_context(|| format!("probing {}", input.display()))?;
    let timestamps = chunk_timestamps(duration.trunc() as u64);
    let total = timestamps.len();
    info!(
        "splitting {} ({}s) into {} chunk(s)",
        input.display(),
        duration.trunc(),
        total
    );

    let jobs: Vec<(usize, Timestamp, PathBuf)> = timestamps
        .into_iter()
        .enumerate()
        .map(|(index, span)| (index, span, output_dir.join(part_file_name(index))))
        .collect();

    let pending: Vec<&(usize, Timestamp, PathBuf)> = jobs
        .iter()
        .filter(|(index, _, path)| {
            let exists = path.exists();
            if exists {
                debug!("chunk {} already exists at {}", index, path.display());
            }
            !exists
        })
        .collect();

    let workers = workers.max(1);
    for wave in pending.chunks(workers) {
        if workers == 1 {
            for job in wave {
                trim_chunk(tool, input, job, total);
            }
            continue;
        }
        thread::scope(|scope| {
            for job in wave {
                scope.spawn(move || trim_chunk(tool, input, job, total));
            }
        });
    }

    Ok(jobs.into_iter().map(|(_, _, path)| path).collect())
}

fn trim_chunk(
    tool: &dyn MediaTool,
    input: &Path,
    job: &(usize, Timestamp, PathBuf),
    total: usize,
) {
    let (index, span, path) = job;
    match trim_into_place(tool, input, path, *span) {
        Ok(()) => debug!("split {} of {}", index + 1, total),
        Err(err) => warn!("failed to write chunk {} of {}: {:#}", index, total, err),
    }
}

/// Trims into a hidden scratch file next to `path` and renames it on
/// success. A failed or interrupted trim never leaves a `part-<i>.mp4`
/// behind, so the next run trims that chunk again.
fn trim_into_place(
    tool: &dyn MediaTool,
    input: &Path,
    path: &Path,
    span: Timestamp,
) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scratch = Builder::new()
        .prefix(".trim-")
        .suffix(".mp4")
        .tempfile_in(dir)
        .with_context(|| format!("creating scratch file in {}", dir.display()))?;
    tool.trim(input, scratch.path(), span)?;
    scratch
        .persist(path)
        .with_context(|| format!("moving trimmed chunk to {}", path.display()))?;
    Ok(())
}
