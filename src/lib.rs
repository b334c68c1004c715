//! Dashforge - MPEG-DASH packaging driven by ffmpeg and MP4Box
//!
//! This library crate exposes the CLI's configuration discovery for
//! integration testing.

pub mod config;
