//! Quality ladder validation and crushing.
//!
//! Crushing drops rungs whose bitrate is not meaningfully below the source's
//! own bitrate, since re-encoding upward only wastes bits. The dropped rungs
//! are replaced by a single stream-copy rung so the ladder still offers the
//! source quality.

use std::cmp::Reverse;
use std::collections::HashSet;

use dashforge_core::{Error, Quality, Result};

/// Check that a requested ladder is non-empty with pairwise distinct bitrates.
pub fn validate_ladder(qualities: &[Quality]) -> Result<()> {
    if qualities.is_empty() {
        return Err(Error::Validation("quality ladder is empty".to_string()));
    }
    let mut seen = HashSet::new();
    for quality in qualities {
        if !seen.insert(quality.bitrate) {
            return Err(Error::Validation(format!(
                "quality ladder repeats bitrate {}k",
                quality.bitrate
            )));
        }
    }
    Ok(())
}

/// Crush `qualities` against a source bitrate of `source_kbps`.
///
/// A rung survives when its bitrate is strictly below
/// `source_kbps * tolerance`. If nothing or everything survives, the input is
/// returned unchanged. Otherwise the survivors are returned, preceded by
/// [`Quality::copy`] unless one of them already is the copy sentinel.
///
/// ```
/// use dashforge_core::Quality;
/// use dashforge_pipeline::ladder::crush;
///
/// let ladder: Vec<Quality> = [6000, 3000, 1000, 500]
///     .into_iter()
///     .map(|b| Quality::new(0, 0, b))
///     .collect();
/// let crushed = crush(&ladder, 5000, 0.95);
/// let bitrates: Vec<u32> = crushed.iter().map(|q| q.bitrate).collect();
/// assert_eq!(bitrates, vec![0, 3000, 1000, 500]);
/// ```
pub fn crush(qualities: &[Quality], source_kbps: u64, tolerance: f64) -> Vec<Quality> {
    let threshold = source_kbps as f64 * tolerance;

    let mut seen = HashSet::new();
    let kept: Vec<Quality> = qualities
        .iter()
        .filter(|q| f64::from(q.bitrate) < threshold)
        .filter(|q| seen.insert(q.bitrate))
        .cloned()
        .collect();

    if kept.is_empty() || kept.len() == qualities.len() {
        return qualities.to_vec();
    }

    if kept.iter().any(Quality::is_copy) {
        return kept;
    }

    let mut result = Vec::with_capacity(kept.len() + 1);
    result.push(Quality::copy());
    result.extend(kept);
    result
}

/// Order a ladder from best to worst: the copy sentinel (source quality)
/// first, then by descending bitrate.
pub fn sort_descending(qualities: &mut [Quality]) {
    qualities.sort_by_key(|q| (!q.is_copy(), Reverse(q.bitrate)));
}
