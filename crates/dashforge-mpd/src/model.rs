//! Typed views of the parts of an MPD the pipeline reads and writes.
//!
//! These are snapshots: reading them from a manifest copies the values out of
//! the element tree, and adding one to a manifest renders it back into
//! elements. Attributes the views do not model stay in the tree untouched.

use crate::xml::Element;

/// A timeline segment of the presentation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Period {
    pub id: Option<String>,
    pub adaptation_sets: Vec<AdaptationSet>,
}

impl Period {
    pub fn from_element(element: &Element) -> Self {
        Self {
            id: element.attribute("id").map(str::to_string),
            adaptation_sets: element
                .children_named("AdaptationSet")
                .map(AdaptationSet::from_element)
                .collect(),
        }
    }
}

/// A group of interchangeable representations of one media type and language.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationSet {
    pub id: Option<String>,
    pub mime_type: Option<String>,
    pub lang: Option<String>,
    pub content_type: Option<String>,
    pub representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn from_element(element: &Element) -> Self {
        let attr = |name: &str| element.attribute(name).map(str::to_string);
        Self {
            id: attr("id"),
            mime_type: attr("mimeType"),
            lang: attr("lang"),
            content_type: attr("contentType"),
            representations: element
                .children_named("Representation")
                .map(Representation::from_element)
                .collect(),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut element = Element::new("AdaptationSet");
        let attrs = [
            ("id", &self.id),
            ("mimeType", &self.mime_type),
            ("lang", &self.lang),
            ("contentType", &self.content_type),
        ];
        for (name, value) in attrs {
            if let Some(value) = value {
                element = element.with_attribute(name, value.as_str());
            }
        }
        self.representations
            .iter()
            .fold(element, |el, rep| el.with_child(rep.to_element()))
    }
}

/// One concrete rendition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Representation {
    /// Identifier; numeric in manifests produced by the packager.
    pub id: String,
    /// Bits per second.
    pub bandwidth: u64,
    pub base_urls: Vec<String>,
}

impl Representation {
    pub fn new(id: impl Into<String>, bandwidth: u64, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bandwidth,
            base_urls: vec![base_url.into()],
        }
    }

    pub fn from_element(element: &Element) -> Self {
        Self {
            id: element.attribute("id").unwrap_or_default().to_string(),
            bandwidth: element
                .attribute("bandwidth")
                .and_then(|b| b.trim().parse().ok())
                .unwrap_or(0),
            base_urls: element
                .children_named("BaseURL")
                .map(|b| b.text())
                .collect(),
        }
    }

    pub fn to_element(&self) -> Element {
        let element = Element::new("Representation")
            .with_attribute("id", self.id.as_str())
            .with_attribute("bandwidth", self.bandwidth.to_string());
        self.base_urls.iter().fold(element, |el, url| {
            el.with_child(Element::new("BaseURL").with_text(url.as_str()))
        })
    }

    /// The id as an integer, if it is one.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.trim().parse().ok()
    }
}
