//! # dashforge-mpd
//!
//! MPEG-DASH manifest codec: [`Manifest::load`] / [`Manifest::save`] over an
//! order-preserving XML tree ([`xml`]), with typed [`Period`],
//! [`AdaptationSet`], and [`Representation`] views for the fields the
//! pipeline edits.

pub mod manifest;
pub mod model;
pub mod xml;

pub use manifest::Manifest;
pub use model::{AdaptationSet, Period, Representation};
