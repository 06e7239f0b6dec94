//! Everything that shells out to ffmpeg/ffprobe.
//!
//! The pipeline only needs three operations from a media toolkit: read a
//! container duration, cut `[start, end)` out of a file, and run a prepared
//! filter graph. They sit behind [`MediaTool`] so the grabbers and the
//! composer can be exercised with fakes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::segment::Timestamp;

/// A fully described ffmpeg render: inputs, a `-filter_complex` graph and the
/// labelled output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub inputs: Vec<PathBuf>,
    pub filter_graph: String,
    /// Label of the final video stream inside `filter_graph`, e.g. `[vout]`.
    pub video_label: String,
    /// Input whose audio (if any) is carried into the output.
    pub audio_input: Option<usize>,
    pub duration: f64,
    pub fps: u32,
    pub threads: usize,
    pub output: PathBuf,
}

pub trait MediaTool: Send + Sync {
    /// Container duration in seconds.
    fn probe_duration(&self, input: &Path) -> Result<f64>;

    /// Writes `input[span.start, span.end)` to `output`.
    fn trim(&self, input: &Path, output: &Path, span: Timestamp) -> Result<()>;

    fn render(&self, plan: &RenderPlan) -> Result<()>;
}

/// [`MediaTool`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::with_programs("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn with_programs(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn render_args(plan: &RenderPlan) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for input in &plan.inputs {
            args.push("-i".into());
            args.push(input.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".into());
        args.push(plan.filter_graph.clone());
        args.push("-map".into());
        args.push(plan.video_label.clone());
        if let Some(index) = plan.audio_input {
            args.push("-map".into());
            args.push(format!("{index}:a?"));
        }

        args.extend([
            "-t".to_string(),
            format!("{:.3}", plan.duration),
            "-r".to_string(),
            plan.fps.to_string(),
            "-threads".to_string(),
            plan.threads.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
        ]);
        args.push(plan.output.to_string_lossy().into_owned());
        args
    }
}

impl MediaTool for Ffmpeg {
    fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("running ffprobe on {}", input.display()))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed for {} (status {}): {}",
                input.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
            .with_context(|| format!("reading duration of {}", input.display()))
    }

    fn trim(&self, input: &Path, output: &Path, span: Timestamp) -> Result<()> {
        debug!(
            "trimming {} [{}, {}) -> {}",
            input.display(),
            span.start,
            span.end,
            output.display()
        );
        let status = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .arg("-ss")
            .arg(span.start.to_string())
            .arg("-to")
            .arg(span.end.to_string())
            .arg(output)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("running ffmpeg to trim {}", input.display()))?;

        if !status.success() {
            bail!("ffmpeg exited with {} while writing {}", status, output.display());
        }
        Ok(())
    }

    fn render(&self, plan: &RenderPlan) -> Result<()> {
        let args = Self::render_args(plan);
        debug!("ffmpeg {}", args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("running ffmpeg to render {}", plan.output.display()))?;

        if !output.status.success() {
            bail!(
                "ffmpeg failed to render {} (status {}): {}",
                plan.output.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Parses ffprobe's bare `format=duration` output.
pub fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .context("ffprobe printed no duration")?;
    let duration: f64 = line
        .parse()
        .with_context(|| format!("parsing duration {line:?}"))?;
    if !duration.is_finite() || duration < 0.0 {
        bail!("invalid duration {duration}");
    }
    Ok(duration)
}

/// Runs `<name> <version_flag>` so missing tools fail before any work starts.
pub fn ensure_program_available(name: &str, version_flag: &str) -> Result<()> {
    let status = Command::new(name)
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("{} is installed but returned a failure status", name),
        Err(err) => bail!("{} is not installed or not in PATH: {}", name, err),
    }
}
