//! Structured ffprobe output.
//!
//! Only the fields the pipeline interprets are modelled; everything else in
//! the JSON is ignored. Tag maps are kept as ordered pair lists because
//! callers fold keys case-insensitively and need to know which duplicate came
//! first.

use std::fmt;

use dashforge_core::{Error, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// Top-level `ffprobe -show_format -show_streams` document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeDocument {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: ProbeFormat,
}

impl ProbeDocument {
    /// Parse ffprobe's JSON output.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))
    }
}

/// Container-level fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    /// Seconds, as a decimal string.
    pub duration: Option<String>,
    /// Bits per second, as a decimal string.
    pub bit_rate: Option<String>,
    #[serde(default, deserialize_with = "ordered_tags")]
    pub tags: Vec<(String, String)>,
}

/// One elementary stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: u32,
    /// `video`, `audio`, `subtitle`, `data`, `attachment`, ...
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_rate: Option<String>,
    #[serde(default, deserialize_with = "ordered_tags")]
    pub tags: Vec<(String, String)>,
}

impl ProbeStream {
    /// Look up a stream tag by case-insensitive key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Deserialize a JSON object into `(key, value)` pairs in document order.
///
/// Non-string values (ffprobe occasionally emits numbers) are rendered with
/// their JSON text.
fn ordered_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TagVisitor;

    impl<'de> Visitor<'de> for TagVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of tag names to values")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tags = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                tags.push((key, value));
            }
            Ok(tags)
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(TagVisitor)
}
