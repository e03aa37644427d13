#![doc = include_str!("../README.md")]

/// The bread-and-butter, shrink-wrapped and ready to use
pub mod prelude {
    pub use crate::Error;
    pub use crate::body::{Body, MARS_FLATTENING, MARS_RADIUS_M};
    pub use crate::catalog::Catalog;
    pub use crate::coordinate::{LatLon, Vec3};
    pub use crate::metadata::{Metadata, Value};
    pub use crate::segment::{PointQuery, TriSegment};
    pub use crate::store::Predicate;
}

/// Extended prelude for authoring localizers and ingestion pipelines
pub mod authoring {
    pub use crate::prelude::*;

    pub use crate::footprint::segment_footprint;
    pub use crate::ingest::{IngestConfig, SegmentationConfig};
    pub use crate::localizer::DEFAULT_RESOLUTION_M;
    pub use crate::localizer::Localizer;
    pub use crate::localizer::LocalizerConstructor;
    pub use crate::localizer::LocalizerSettings;
    pub use crate::localizer::Registry;
    pub use crate::math::sphere::{geodesic_distance, haversine, latlon_to_unit, unit_to_latlon};
    pub use crate::tree::SegmentTree;

    // External material
    pub use log::debug;
    pub use log::error;
    pub use log::info;
    pub use log::trace;
    pub use log::warn;
    pub use std::collections::BTreeMap;
}

use thiserror::Error;
/// The terradex error messaging enumeration
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("database error")]
    Database(#[from] rusqlite::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),

    #[error("unsupported map projection '{0}'")]
    UnsupportedProjection(String),

    #[error("no localizer registered for instrument '{0}'")]
    NoLocalizer(String),

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("no spatial index for instrument '{0}'")]
    NoSpatialIndex(String),

    #[error("bad predicate: {0}")]
    BadPredicate(String),

    #[error("corrupt artifact '{0}': {1}")]
    CorruptArtifact(String, String),

    #[error("segmentation of '{0}' failed: {1}")]
    Segmenter(String, Box<Error>),

    #[error("missing metadata field '{0}'")]
    MissingField(String),

    #[error("malformed value for '{0}': '{1}'")]
    BadParam(String, String),

    #[error("invalid: {0}")]
    Invalid(String),
}

pub mod body;
pub mod catalog;
pub mod coordinate;
pub mod footprint;
pub mod ingest;
pub mod localizer;
pub mod math;
pub mod metadata;
pub mod segment;
pub mod store;
pub mod tree;
