//! Precondition failures surfaced by the pipeline.
//!
//! Anything that is an environmental failure (I/O, HTTP, subprocess) travels
//! as `anyhow::Error` with context. The variants below are the cases where the
//! pipeline was asked to do something before its inputs exist, so callers can
//! decide whether to abort or download first.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("gameplay not downloaded")]
    GameplayNotDownloaded,

    #[error("video not downloaded: {} does not exist", .directory.display())]
    VideoNotDownloaded { directory: PathBuf },

    #[error("{} has not been created before splitting video", .directory.display())]
    SplitBeforeDownload { directory: PathBuf },

    #[error("no channel matches {query:?}")]
    ChannelNotFound { query: String },

    #[error("no gameplay chunks found in {}", .directory.display())]
    NoGameplayClips { directory: PathBuf },
}
