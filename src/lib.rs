#![forbid(unsafe_code)]

//! Turns the uploads of one YouTube channel into vertical split-screen
//! shorts: the channel video on top, a chunk of gameplay footage below, and
//! the title plus a `Part i/N` caption drawn over a black canvas.
//!
//! [`pipeline::run_once`] drives one pass; the other modules are the pieces
//! it wires together. External programs (`yt-dlp`, `ffmpeg`, `ffprobe`) and
//! the YouTube Data API sit behind traits so every step can be exercised
//! with fakes.

pub mod compose;
pub mod config;
pub mod download;
pub mod error;
pub mod fsutil;
pub mod gameplay;
pub mod media;
pub mod pipeline;
pub mod segment;
pub mod text;
pub mod video;
pub mod youtube;

#[cfg(test)]
mod test_support;
