//! One pass of the pipeline: pick the first channel video without an output
//! directory, cut it into parts, and render each part over gameplay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::compose::{ClipComposer, ClipJob, ComposeOptions};
use crate::error::PipelineError;
use crate::fsutil::{ensure_directory, sanitize_component};
use crate::gameplay::GameplayGrabber;
use crate::media::MediaTool;
use crate::video::{VideoMetadata, YoutubeVideo};
use crate::youtube::ChannelGrabber;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_root: PathBuf,
    pub compose: ComposeOptions,
    /// Gameplay chunk paired with part 0 of the first listed video.
    pub gameplay_start_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Processed {
        title: String,
        output_directory: PathBuf,
        rendered: usize,
        failed: usize,
    },
    /// Every listed video already has an output directory.
    NothingToDo,
}

/// Gameplay chunk used for part `part_index` of the video at `video_index`
/// in the channel listing. Wraps around when the gameplay runs out.
pub fn gameplay_chunk_index(
    start_index: usize,
    video_index: usize,
    part_index: usize,
    available: usize,
) -> usize {
    (start_index + video_index + part_index) % available.max(1)
}

pub fn run_once(
    channel: &ChannelGrabber,
    gameplay: &mut GameplayGrabber,
    media: &dyn MediaTool,
    options: &PipelineOptions,
) -> Result<RunOutcome> {
    let items = channel.list_videos()?;
    let gameplay_clips = gameplay.download()?;
    if gameplay_clips.is_empty() {
        return Err(PipelineError::NoGameplayClips {
            directory: gameplay.video_directory().to_path_buf(),
        }
        .into());
    }
    ensure_directory(&options.output_root)?;

    for (video_index, item) in items.iter().enumerate() {
        let metadata = match VideoMetadata::from_search_item(item) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("skipping listing entry: {:#}", err);
                continue;
            }
        };
        let output_directory = options
            .output_root
            .join(sanitize_component(&metadata.title));
        if output_directory.exists() {
            info!("Video {} already exists, skipping", metadata.title);
            continue;
        }

        let mut video = YoutubeVideo::new(channel, metadata);
        video.download()?;
        video.split()?;
        let splits = video.video_splits()?;
        ensure_directory(&output_directory)?;

        let total_parts = splits.len();
        let mut rendered = 0;
        let mut failed = 0;
        for (part_index, source_clip) in splits.iter().enumerate() {
            // Positions in the listing, so a chunk missing on disk is never picked.
            let gameplay_clip = &gameplay_clips[gameplay_chunk_index(
                options.gameplay_start_index,
                video_index,
                part_index,
                gameplay_clips.len(),
            )];
            let composer = ClipComposer::new(ClipJob {
                video: video.metadata(),
                output_directory: &output_directory,
                source_clip,
                gameplay_clip,
                part_index,
                total_parts,
            })
            .with_context(|| format!("preparing part {} of {}", part_index + 1, video.title()))?;

            match composer.build(media, &options.compose) {
                Ok(_) => rendered += 1,
                Err(err) => {
                    warn!(
                        "failed to render part {} of {}: {:#}",
                        part_index + 1,
                        video.title(),
                        err
                    );
                    failed += 1;
                }
            }
        }

        return Ok(RunOutcome::Processed {
            title: video.title().to_owned(),
            output_directory,
            rendered,
            failed,
        });
    }

    Ok(RunOutcome::NothingToDo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDownloader, FakeMedia, FakeSearchApi, search_item};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    const GAMEPLAY_URL: &str = "https://www.youtube.com/watch?v=gp";

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        downloader: Arc<FakeDownloader>,
        media: Arc<FakeMedia>,
    }

    impl Fixture {
        fn new(media: FakeMedia) -> Result<Self> {
            let dir = tempdir()?;
            Ok(Self {
                root: dir.path().to_path_buf(),
                _dir: dir,
                downloader: Arc::new(FakeDownloader::default()),
                media: Arc::new(media),
            })
        }

        fn channel(&self) -> Result<ChannelGrabber> {
            let api = FakeSearchApi::new("UCsam").with_pages(vec![(
                vec![search_item("v1", "First"), search_item("v2", "Second")],
                None,
            )]);
            ChannelGrabber::new(
                "SamONellaAcademy",
                &self.root.join("data"),
                Box::new(api),
                self.downloader.clone(),
                self.media.clone(),
            )
        }

        fn gameplay(&self) -> Result<GameplayGrabber> {
            GameplayGrabber::new(
                GAMEPLAY_URL,
                &self.root.join("data"),
                self.downloader.clone(),
                self.media.clone(),
            )
        }

        fn options(&self) -> PipelineOptions {
            PipelineOptions {
                output_root: self.root.join("output"),
                compose: ComposeOptions::default(),
                gameplay_start_index: 1,
            }
        }

        fn run(&self) -> Result<RunOutcome> {
            let channel = self.channel()?;
            let mut gameplay = self.gameplay()?;
            run_once(&channel, &mut gameplay, self.media.as_ref(), &self.options())
        }

        fn output(&self, relative: &str) -> PathBuf {
            self.root.join("output").join(relative)
        }
    }

    #[test]
    fn gameplay_index_is_explicit_and_wraps() {
        assert_eq!(gameplay_chunk_index(1, 0, 0, 10), 1);
        assert_eq!(gameplay_chunk_index(1, 0, 3, 10), 4);
        assert_eq!(gameplay_chunk_index(1, 2, 0, 10), 3);
        assert_eq!(gameplay_chunk_index(1, 1, 2, 3), 1);
    }

    #[test]
    fn processes_first_unprocessed_video_only() -> Result<()> {
        let fixture = Fixture::new(FakeMedia::with_duration(180.0))?;
        fs::create_dir_all(fixture.output("First"))?;

        let outcome = fixture.run()?;
        assert_eq!(
            outcome,
            RunOutcome::Processed {
                title: "Second".into(),
                output_directory: fixture.output("Second"),
                rendered: 3,
                failed: 0,
            }
        );

        assert_eq!(
            fixture.downloader.downloads(),
            vec![GAMEPLAY_URL.to_string(), "https://www.youtube.com/watch?v=v2".to_string()]
        );
        assert_eq!(fs::read_dir(fixture.output("First"))?.count(), 0);
        for part in 0..3 {
            assert!(fixture.output(&format!("Second/part-{part}/output.mp4")).is_file());
            assert!(fixture.output(&format!("Second/part-{part}/metadata.json")).is_file());
        }

        let gameplay_dir = fixture.root.join("data/Gameplay/gp");
        let paired: Vec<PathBuf> = fixture
            .media
            .renders()
            .iter()
            .map(|plan| plan.inputs[1].clone())
            .collect();
        assert_eq!(
            paired,
            vec![
                gameplay_dir.join("part-2.mp4"),
                gameplay_dir.join("part-0.mp4"),
                gameplay_dir.join("part-1.mp4"),
            ]
        );
        Ok(())
    }

    #[test]
    fn gameplay_pairing_uses_chunks_present_on_disk() -> Result<()> {
        let fixture = Fixture::new(FakeMedia::with_duration(180.0))?;
        let gameplay_dir = fixture.root.join("data/Gameplay/gp");
        fs::create_dir_all(&gameplay_dir)?;
        for index in [0, 2, 3] {
            fs::write(gameplay_dir.join(format!("part-{index}.mp4")), "gameplay")?;
        }

        fixture.run()?;
        assert_eq!(
            fixture.downloader.downloads(),
            vec!["https://www.youtube.com/watch?v=v1".to_string()]
        );
        let paired: Vec<PathBuf> = fixture
            .media
            .renders()
            .iter()
            .map(|plan| plan.inputs[1].clone())
            .collect();
        assert_eq!(
            paired,
            vec![
                gameplay_dir.join("part-2.mp4"),
                gameplay_dir.join("part-3.mp4"),
                gameplay_dir.join("part-0.mp4"),
            ]
        );
        Ok(())
    }

    #[test]
    fn second_run_skips_everything_already_processed() -> Result<()> {
        let fixture = Fixture::new(FakeMedia::with_duration(120.0))?;

        let first = fixture.run()?;
        assert!(matches!(first, RunOutcome::Processed { ref title, .. } if title == "First"));
        let second = fixture.run()?;
        assert!(matches!(second, RunOutcome::Processed { ref title, .. } if title == "Second"));
        let downloads = fixture.downloader.downloads().len();
        let trims = fixture.media.trims().len();

        assert_eq!(fixture.run()?, RunOutcome::NothingToDo);
        assert_eq!(fixture.downloader.downloads().len(), downloads);
        assert_eq!(fixture.media.trims().len(), trims);
        Ok(())
    }

    #[test]
    fn render_failures_are_counted_not_fatal() -> Result<()> {
        let fixture = Fixture::new(FakeMedia::with_duration(130.0).failing_renders())?;
        let outcome = fixture.run()?;
        assert_eq!(
            outcome,
            RunOutcome::Processed {
                title: "First".into(),
                output_directory: fixture.output("First"),
                rendered: 0,
                failed: 2,
            }
        );
        assert!(fixture.output("First/part-1/metadata.json").is_file());
        assert!(!Path::new(&fixture.output("First/part-1/output.mp4")).exists());
        Ok(())
    }

    #[test]
    fn missing_gameplay_chunks_abort_the_run() -> Result<()> {
        let fixture = Fixture::new(FakeMedia::with_duration(120.0).failing_trims())?;
        let err = fixture.run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoGameplayClips { .. })
        ));
        Ok(())
    }
}
