//! dashforge-core: shared error type, configuration, and media-domain types.
//!
//! This crate is the foundational dependency for all other dashforge crates,
//! providing the unified [`Error`], the TOML-backed [`config::Config`], and
//! the types that flow between probing, planning, and packaging
//! ([`Quality`], [`StreamFile`], [`EncodeOptions`]).

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
