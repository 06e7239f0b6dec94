//! Builds one vertical short from a source chunk and a gameplay chunk.
//!
//! Canvas layout (720x1280, everything shifted down by `TOP_OFFSET`):
//!
//! ```text
//!   y = 50 + 80                  title, wrapped to 80% of the width
//!   y = 60 + 50*lines + 80       "Part N of M"
//!   y = 640 - h + 80             source chunk (bottom edge on the centre line)
//!   y = 640 + 80                 gameplay chunk, muted
//! ```
//!
//! Without the gameplay overlay the source chunk is centred instead
//! (`y = 640 - h/2 + 80`) and the clip lasts as long as the source.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::fsutil::ensure_directory;
use crate::media::{MediaTool, RenderPlan};
use crate::text::{GlyphWidths, SoftWrap};
use crate::video::VideoMetadata;

pub const CANVAS_WIDTH: u32 = 720;
pub const CANVAS_HEIGHT: u32 = 1280;
pub const TOP_OFFSET: u32 = 80;
pub const FONT_SIZE: u32 = 40;
pub const LETTER_SPACING: f32 = 1.0;
pub const LINE_HEIGHT: u32 = 50;
pub const TITLE_WIDTH_RATIO: f32 = 0.8;
pub const FPS: u32 = 24;
pub const DEFAULT_RENDER_THREADS: usize = 4;

const TITLE_TOP: u32 = 50;
const CAPTION_TOP: u32 = 60;
const TITLE_FONT: &str = "Arial:style=Bold";
const CAPTION_FONT: &str = "Arial";

pub const OUTPUT_FILE: &str = "output.mp4";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Stack the gameplay chunk under the source chunk. When off, only the
    /// source chunk is composited and the gameplay chunk is ignored.
    pub include_gameplay_overlay: bool,
    pub render_threads: usize,
    /// Title measurement. A font file here is also what drawtext renders
    /// with; otherwise the named system fonts are used.
    pub glyphs: GlyphWidths,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            include_gameplay_overlay: true,
            render_threads: DEFAULT_RENDER_THREADS,
            glyphs: GlyphWidths::Estimated,
        }
    }
}

/// Inputs for one output part.
#[derive(Debug, Clone, Copy)]
pub struct ClipJob<'a> {
    pub video: &'a VideoMetadata,
    /// `output/<title>`; the part lands in `part-<part_index>/` below it.
    pub output_directory: &'a Path,
    pub source_clip: &'a Path,
    pub gameplay_clip: &'a Path,
    pub part_index: usize,
    pub total_parts: usize,
}

#[derive(Serialize)]
struct ClipMetadata<'a> {
    title: &'a str,
    tags: &'a [String],
}

/// Text placement for one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    pub title: SoftWrap,
    pub title_y: u32,
    pub title_box_height: u32,
    pub caption: String,
    pub caption_y: u32,
}

pub fn layout_text(
    glyphs: &GlyphWidths,
    title: &str,
    part_index: usize,
    total_parts: usize,
) -> TextLayout {
    let title = glyphs.soft_wrap(
        title,
        FONT_SIZE as f32,
        LETTER_SPACING,
        CANVAS_WIDTH as f32 * TITLE_WIDTH_RATIO,
    );
    let lines = title.lines as u32;
    TextLayout {
        title_y: TITLE_TOP + TOP_OFFSET,
        title_box_height: LINE_HEIGHT * lines,
        caption: format!("Part {} of {}", part_index + 1, total_parts),
        caption_y: CAPTION_TOP + LINE_HEIGHT * lines + TOP_OFFSET,
        title,
    }
}

pub struct ClipComposer<'a> {
    job: ClipJob<'a>,
    output_path: PathBuf,
    metadata_path: PathBuf,
}

impl<'a> ClipComposer<'a> {
    /// Creates `part-<i>/` and writes `metadata.json` right away, so the
    /// sidecar exists even if rendering fails later.
    pub fn new(job: ClipJob<'a>) -> Result<Self> {
        let part_directory =
            ensure_directory(job.output_directory.join(format!("part-{}", job.part_index)))?;
        let composer = Self {
            output_path: part_directory.join(OUTPUT_FILE),
            metadata_path: part_directory.join(METADATA_FILE),
            job,
        };
        composer.write_metadata()?;
        Ok(composer)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    fn write_metadata(&self) -> Result<()> {
        let metadata = ClipMetadata {
            title: &self.job.video.title,
            tags: self.job.video.keywords.as_deref().unwrap_or_default(),
        };
        let file = File::create(&self.metadata_path)
            .with_context(|| format!("creating {}", self.metadata_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &metadata)
            .with_context(|| format!("writing {}", self.metadata_path.display()))?;
        writer.flush()?;
        Ok(())
    }

    /// Renders the part to `output.mp4`.
    pub fn build(&self, media: &dyn MediaTool, options: &ComposeOptions) -> Result<PathBuf> {
        let source_duration = media.probe_duration(self.job.source_clip)?;
        let mut inputs = vec![self.job.source_clip.to_path_buf()];
        let mut duration = source_duration;
        if options.include_gameplay_overlay {
            let gameplay_duration = media.probe_duration(self.job.gameplay_clip)?;
            duration = duration.max(gameplay_duration);
            inputs.push(self.job.gameplay_clip.to_path_buf());
        }

        let layout = layout_text(
            &options.glyphs,
            &self.job.video.title,
            self.job.part_index,
            self.job.total_parts,
        );
        // drawtext reads the strings from files so titles need no escaping.
        let title_file = text_file(&layout.title.text)?;
        let caption_file = text_file(&layout.caption)?;

        let plan = RenderPlan {
            inputs,
            filter_graph: filter_graph(
                &layout,
                title_file.path(),
                caption_file.path(),
                duration,
                options,
            ),
            video_label: "[vout]".to_owned(),
            audio_input: Some(0),
            duration,
            fps: FPS,
            threads: options.render_threads.max(1),
            output: self.output_path.clone(),
        };

        info!(
            "Rendering part {} of {} ({:.1}s) to {}",
            self.job.part_index + 1,
            self.job.total_parts,
            duration,
            self.output_path.display()
        );
        media.render(&plan)?;
        Ok(self.output_path.clone())
    }
}

fn text_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("creating overlay text file")?;
    file.write_all(contents.as_bytes())
        .context("writing overlay text file")?;
    file.flush()?;
    Ok(file)
}

/// Quotes a filter option value.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn font_option(font_file: Option<&Path>, family: &str) -> String {
    match font_file {
        Some(path) => format!("fontfile={}", quote(&path.to_string_lossy())),
        None => format!("font={}", quote(family)),
    }
}

fn drawtext(text_file: &Path, font: String, y: String) -> String {
    format!(
        "drawtext=textfile={}:expansion=none:{}:fontsize={}:fontcolor=white:\
         text_align=C:line_spacing={}:x=(w-text_w)/2:y={}",
        quote(&text_file.to_string_lossy()),
        font,
        FONT_SIZE,
        LINE_HEIGHT - FONT_SIZE,
        y
    )
}

fn filter_graph(
    layout: &TextLayout,
    title_file: &Path,
    caption_file: &Path,
    duration: f64,
    options: &ComposeOptions,
) -> String {
    let centre_y = CANVAS_HEIGHT / 2;
    let font_file = options.glyphs.font_file();
    let mut graph = vec![
        format!("color=c=black:s={CANVAS_WIDTH}x{CANVAS_HEIGHT}:r={FPS}:d={duration:.3}[bg]"),
        format!(
            "[bg]{}[titled]",
            drawtext(
                title_file,
                font_option(font_file, TITLE_FONT),
                format!("{}+({}-text_h)/2", layout.title_y, layout.title_box_height),
            )
        ),
        format!(
            "[titled]{}[captioned]",
            drawtext(
                caption_file,
                font_option(font_file, CAPTION_FONT),
                format!("{}+({}-text_h)/2", layout.caption_y, LINE_HEIGHT),
            )
        ),
        format!("[0:v]scale={CANVAS_WIDTH}:-2[src]"),
    ];

    if options.include_gameplay_overlay {
        graph.push(format!("[1:v]scale={CANVAS_WIDTH}:-2[gameplay]"));
        graph.push(format!(
            "[captioned][src]overlay=x=(W-w)/2:y={centre_y}-h+{TOP_OFFSET}:eof_action=pass[withsrc]"
        ));
        graph.push(format!(
            "[withsrc][gameplay]overlay=x=(W-w)/2:y={}:eof_action=pass[vout]",
            centre_y + TOP_OFFSET
        ));
    } else {
        graph.push(format!(
            "[captioned][src]overlay=x=(W-w)/2:y={centre_y}-h/2+{TOP_OFFSET}:eof_action=pass[vout]"
        ));
    }

    graph.join(";")
}
