//! Media probing.
//!
//! The [`Prober`] trait is the seam between the pipeline and whatever reads
//! source metadata. [`FfprobeProber`] is the production backend.

pub mod document;
pub mod ffprobe;

use std::path::Path;

use async_trait::async_trait;
use dashforge_core::Result;

pub use self::document::{ProbeDocument, ProbeFormat, ProbeStream};
pub use self::ffprobe::FfprobeProber;

/// A media file prober.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe a media file and return its structured description.
    ///
    /// Fails with [`dashforge_core::Error::Probe`] when the output cannot be
    /// read into a [`ProbeDocument`].
    async fn probe(&self, path: &Path) -> Result<ProbeDocument>;
}
