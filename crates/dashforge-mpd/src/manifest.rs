//! MPD document loading, editing, and saving.

use std::path::Path;

use dashforge_core::{Error, Result};

use crate::model::{AdaptationSet, Period};
use crate::xml::{Document, Element};

/// A DASH media presentation description.
///
/// Wraps the full element tree so that saving a loaded manifest reproduces
/// everything the editing methods did not touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    document: Document,
}

impl Manifest {
    /// Parse a manifest from XML text. The root element must be `MPD`.
    pub fn parse(xml: &str) -> Result<Self> {
        let document = Document::parse(xml)?;
        if document.root.local_name() != "MPD" {
            return Err(Error::manifest(format!(
                "expected MPD root element, found <{}>",
                document.root.name
            )));
        }
        Ok(Self { document })
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| Error::manifest(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&xml)
    }

    /// Serialize and write the manifest to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml_string()?;
        std::fs::write(path, xml)
            .map_err(|e| Error::manifest(format!("failed to write {}: {e}", path.display())))?;
        tracing::debug!("wrote manifest {}", path.display());
        Ok(())
    }

    pub fn to_xml_string(&self) -> Result<String> {
        self.document.to_xml_string()
    }

    /// The `MPD` root element.
    pub fn root(&self) -> &Element {
        &self.document.root
    }

    /// Typed snapshot of every period, in document order.
    pub fn periods(&self) -> Vec<Period> {
        self.document
            .root
            .children_named("Period")
            .map(Period::from_element)
            .collect()
    }

    /// Remove `ProgramInformation` blocks (title, source, copyright).
    /// Returns how many were removed.
    pub fn strip_program_information(&mut self) -> usize {
        self.document
            .root
            .remove_children_named("ProgramInformation")
    }

    /// Ids of every representation in every period, in document order.
    pub fn representation_ids(&self) -> Vec<String> {
        self.periods()
            .into_iter()
            .flat_map(|p| p.adaptation_sets)
            .flat_map(|a| a.representations)
            .map(|r| r.id)
            .collect()
    }

    /// Largest representation id that parses as an integer.
    pub fn max_representation_id(&self) -> Option<u64> {
        self.periods()
            .iter()
            .flat_map(|p| &p.adaptation_sets)
            .flat_map(|a| &a.representations)
            .filter_map(|r| r.numeric_id())
            .max()
    }

    /// Text of every `BaseURL` element anywhere in the document.
    pub fn base_urls(&self) -> Vec<String> {
        self.document
            .root
            .descendants_named("BaseURL")
            .into_iter()
            .map(|e| e.text())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Append `set` to the period at `period_index`, after its last existing
    /// adaptation set.
    pub fn append_adaptation_set(&mut self, period_index: usize, set: &AdaptationSet) -> Result<()> {
        let period = self
            .document
            .root
            .children_named_mut("Period")
            .nth(period_index)
            .ok_or_else(|| Error::manifest(format!("no period at index {period_index}")))?;
        period.insert_after_last("AdaptationSet", set.to_element());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Representation;

    const TWO_PERIODS: &str = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
 <ProgramInformation moreInformationURL="http://gpac.io">
  <Title>movie.mpd generated by GPAC</Title>
 </ProgramInformation>
 <Period id="p0">
  <AdaptationSet mimeType="video/mp4">
   <Representation id="1" bandwidth="3000000"><BaseURL>movie_3000_dashinit.mp4</BaseURL></Representation>
   <Representation id="abc" bandwidth="1000000"><BaseURL>movie_1000_dashinit.mp4</BaseURL></Representation>
  </AdaptationSet>
  <AdaptationSet mimeType="audio/mp4" lang="eng">
   <Representation id="5" bandwidth="128000"><BaseURL>movie_audio_128_dashinit.mp4</BaseURL></Representation>
  </AdaptationSet>
 </Period>
 <Period id="p1">
  <AdaptationSet mimeType="video/mp4">
   <Representation id="3" bandwidth="3000000"/>
  </AdaptationSet>
 </Period>
</MPD>"#;

    #[test]
    fn reads_periods_and_representations() {
        let manifest = Manifest::parse(TWO_PERIODS).unwrap();
        let periods = manifest.periods();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].id.as_deref(), Some("p0"));
        assert_eq!(periods[0].adaptation_sets.len(), 2);
        assert_eq!(periods[0].adaptation_sets[1].lang.as_deref(), Some("eng"));
        assert_eq!(
            periods[0].adaptation_sets[0].representations[0].base_urls,
            vec!["movie_3000_dashinit.mp4"]
        );
        assert_eq!(manifest.representation_ids(), vec!["1", "abc", "5", "3"]);
    }

    #[test]
    fn max_id_ignores_non_numeric() {
        let manifest = Manifest::parse(TWO_PERIODS).unwrap();
        assert_eq!(manifest.max_representation_id(), Some(5));

        let empty = Manifest::parse("<MPD><Period/></MPD>").unwrap();
        assert_eq!(empty.max_representation_id(), None);
    }

    #[test]
    fn strips_program_information() {
        let mut manifest = Manifest::parse(TWO_PERIODS).unwrap();
        assert_eq!(manifest.strip_program_information(), 1);
        assert_eq!(manifest.strip_program_information(), 0);
        assert!(!manifest.to_xml_string().unwrap().contains("Title"));
        assert_eq!(manifest.periods().len(), 2);
    }

    #[test]
    fn base_urls_cover_whole_document() {
        let manifest = Manifest::parse(TWO_PERIODS).unwrap();
        assert_eq!(
            manifest.base_urls(),
            vec![
                "movie_3000_dashinit.mp4",
                "movie_1000_dashinit.mp4",
                "movie_audio_128_dashinit.mp4"
            ]
        );
    }

    #[test]
    fn append_adaptation_set_targets_period() {
        let mut manifest = Manifest::parse(TWO_PERIODS).unwrap();
        let set = AdaptationSet {
            mime_type: Some("text/vtt".into()),
            lang: Some("fr".into()),
            content_type: Some("text".into()),
            representations: vec![Representation::new("6", 256, "movie_subtitle_fr_0.vtt")],
            ..AdaptationSet::default()
        };
        manifest.append_adaptation_set(1, &set).unwrap();

        let periods = manifest.periods();
        assert_eq!(periods[0].adaptation_sets.len(), 2);
        assert_eq!(periods[1].adaptation_sets.len(), 2);
        assert_eq!(periods[1].adaptation_sets[1], set);

        assert!(manifest.append_adaptation_set(2, &set).is_err());
    }

    #[test]
    fn rejects_non_mpd_root() {
        let err = Manifest::parse("<html/>").unwrap_err();
        assert!(err.to_string().contains("expected MPD root"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mpd");
        let manifest = Manifest::parse(TWO_PERIODS).unwrap();
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);

        let missing = Manifest::load(&dir.path().join("missing.mpd")).unwrap_err();
        assert!(matches!(missing, Error::Manifest(_)));
    }
}
