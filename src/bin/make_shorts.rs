#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gameplay_shorts::{
    compose::ComposeOptions,
    config::{DEFAULT_ENV_PATH, Settings, load_settings_from},
    download::{StreamDownloader, YtDlp},
    gameplay::GameplayGrabber,
    media::{Ffmpeg, MediaTool, ensure_program_available},
    pipeline::{PipelineOptions, RunOutcome, run_once},
    text::GlyphWidths,
    youtube::{ChannelGrabber, DataApiClient},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Render the next unprocessed channel video as split-screen gameplay shorts."
)]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH, help = "KEY=VALUE file holding GOOGLE_API_KEY and overrides")]
    env_file: PathBuf,
    #[arg(long = "channel", value_name = "NAME", help = "Channel to search for")]
    channel: Option<String>,
    #[arg(long = "gameplay-url", value_name = "URL", help = "Gameplay video to pair with")]
    gameplay_url: Option<String>,
    #[arg(long = "data-root", value_name = "PATH", help = "Downloads and caches (default data)")]
    data_root: Option<PathBuf>,
    #[arg(long = "output-root", value_name = "PATH", help = "Rendered shorts (default output)")]
    output_root: Option<PathBuf>,
    #[arg(long = "no-gameplay-overlay", help = "Leave the lower half black")]
    no_gameplay_overlay: bool,
    #[arg(long = "gameplay-start-index", value_name = "N")]
    gameplay_start_index: Option<usize>,
    #[arg(long = "split-workers", value_name = "N", help = "Concurrent trims while splitting")]
    split_workers: Option<usize>,
    #[arg(long = "render-threads", value_name = "N", help = "ffmpeg -threads for each render")]
    render_threads: Option<usize>,
    #[arg(long = "cookies", value_name = "PATH", help = "Cookie file handed to yt-dlp")]
    cookies: Option<PathBuf>,
    #[arg(
        long = "title-font-file",
        value_name = "PATH",
        help = "Font to measure and draw titles with"
    )]
    title_font_file: Option<PathBuf>,
}

impl Cli {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(channel) = self.channel {
            settings.target_channel = channel;
        }
        if let Some(url) = self.gameplay_url {
            settings.gameplay_url = url;
        }
        if let Some(data_root) = self.data_root {
            settings.data_root = data_root;
        }
        if let Some(output_root) = self.output_root {
            settings.output_root = output_root;
        }
        if self.no_gameplay_overlay {
            settings.include_gameplay_overlay = false;
        }
        if let Some(index) = self.gameplay_start_index {
            settings.gameplay_start_index = index;
        }
        if let Some(workers) = self.split_workers {
            settings.split_workers = workers.max(1);
        }
        if let Some(threads) = self.render_threads {
            settings.render_threads = threads.max(1);
        }
        if let Some(font) = self.title_font_file {
            settings.title_font_file = Some(font);
        }
        settings
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cookies = cli.cookies.clone();
    let loaded = load_settings_from(&cli.env_file)?;
    let settings = cli.apply(loaded);

    ensure_program_available("ffmpeg", "-version")?;
    ensure_program_available("ffprobe", "-version")?;
    ensure_program_available("yt-dlp", "--version")?;

    let mut ytdlp = YtDlp::default();
    if let Some(cookies) = cookies {
        ytdlp = ytdlp.with_cookies(cookies);
    }
    let downloader: Arc<dyn StreamDownloader> = Arc::new(ytdlp);
    let media: Arc<dyn MediaTool> = Arc::new(Ffmpeg::default());

    let channel = ChannelGrabber::new(
        settings.target_channel.clone(),
        &settings.data_root,
        Box::new(DataApiClient::new(settings.api_key.clone())),
        downloader.clone(),
        media.clone(),
    )
    .with_context(|| format!("Preparing channel {}", settings.target_channel))?
    .with_split_workers(settings.split_workers);

    let mut gameplay = GameplayGrabber::new(
        settings.gameplay_url.clone(),
        &settings.data_root,
        downloader,
        media.clone(),
    )?
    .with_split_workers(settings.split_workers);

    let glyphs = match &settings.title_font_file {
        Some(path) => GlyphWidths::from_font_file(path)?,
        None => GlyphWidths::Estimated,
    };

    let options = PipelineOptions {
        output_root: settings.output_root.clone(),
        compose: ComposeOptions {
            include_gameplay_overlay: settings.include_gameplay_overlay,
            render_threads: settings.render_threads,
            glyphs,
        },
        gameplay_start_index: settings.gameplay_start_index,
    };

    match run_once(&channel, &mut gameplay, media.as_ref(), &options)? {
        RunOutcome::Processed {
            title,
            output_directory,
            rendered,
            failed,
        } => {
            info!(
                "{}: {} part(s) rendered into {}",
                title,
                rendered,
                output_directory.display()
            );
            if failed > 0 {
                warn!("{}: {} part(s) failed to render", title, failed);
            }
        }
        RunOutcome::NothingToDo => {
            info!("Every video of {} is already processed", settings.target_channel)
        }
    }
    Ok(())
}
