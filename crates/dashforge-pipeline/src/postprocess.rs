//! Manifest post-processing: metadata stripping and subtitle injection.

use std::path::Path;

use dashforge_core::{Error, Result, StreamFile};
use dashforge_mpd::{AdaptationSet, Manifest, Representation};

use crate::plan::UNDETERMINED_LANGUAGE;

/// Nominal bandwidth (bits/s) declared for WebVTT representations.
pub const SUBTITLE_BANDWIDTH: u64 = 256;

pub const SUBTITLE_MIME_TYPE: &str = "text/vtt";
pub const SUBTITLE_CONTENT_TYPE: &str = "text";

/// Return a copy of `manifest` with program information removed and one
/// WebVTT adaptation set per subtitle appended to every period.
///
/// New representation ids continue from the largest numeric id already in the
/// document (starting at 1 when there is none) and increase by one per added
/// representation, across periods and subtitles alike, so every id stays
/// unique. Running out of ids is a manifest error.
pub fn inject_subtitles(manifest: &Manifest, subtitles: &[StreamFile]) -> Result<Manifest> {
    let mut result = manifest.clone();
    if result.strip_program_information() > 0 {
        tracing::debug!("removed program information from manifest");
    }

    let mut next_id = result
        .max_representation_id()
        .map_or(Some(1), |max| max.checked_add(1));
    let period_count = result.periods().len();

    for period in 0..period_count {
        for subtitle in subtitles {
            let Some(base_url) = subtitle.file_name() else {
                tracing::warn!("subtitle {} has no file name", subtitle.path.display());
                continue;
            };
            let id = next_id.ok_or_else(|| {
                Error::manifest("no representation id left after the largest existing one")
            })?;
            let set = AdaptationSet {
                mime_type: Some(SUBTITLE_MIME_TYPE.to_string()),
                lang: Some(
                    subtitle
                        .name
                        .clone()
                        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string()),
                ),
                content_type: Some(SUBTITLE_CONTENT_TYPE.to_string()),
                representations: vec![Representation::new(
                    id.to_string(),
                    SUBTITLE_BANDWIDTH,
                    base_url,
                )],
                ..AdaptationSet::default()
            };
            result.append_adaptation_set(period, &set)?;
            next_id = id.checked_add(1);
        }
    }

    Ok(result)
}

/// Load the manifest at `path`, inject `subtitles`, and write it back.
pub fn process_manifest_file(path: &Path, subtitles: &[StreamFile]) -> Result<Manifest> {
    let manifest = Manifest::load(path)?;
    let processed = inject_subtitles(&manifest, subtitles)?;
    processed.save(path)?;
    Ok(processed)
}
