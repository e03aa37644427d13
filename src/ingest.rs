//! The ingestion driver: turns parsed metadata rows for one instrument
//! into the three per-instrument artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::Error;
use crate::footprint::segment_footprint;
use crate::localizer::{LocalizerSettings, Registry};
use crate::metadata::{
    METADATA_DB_SUFFIX, Metadata, SEGMENT_DB_SUFFIX, SEGMENT_TREE_SUFFIX, Value,
};
use crate::store::{MetadataStore, SegmentStore};
use crate::tree::SegmentTree;

/// Default segmenter resolution in meters. A good instrument-specific
/// choice is the average across-track width of an observation, which
/// yields roughly isosceles triangles.
pub const DEFAULT_SEGMENT_RESOLUTION_M: f64 = 50_000.;

/// One column of the metadata table:
/// `[source field, stored name, sql type]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSpec(pub String, pub String, pub String);

impl ColumnSpec {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn stored(&self) -> &str {
        &self.1
    }

    #[must_use]
    pub fn sql_type(&self) -> &str {
        &self.2
    }
}

/// Segmentation knobs of the ingest configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Target side length of the triangular segments, in meters
    pub resolution: f64,
    /// Forwarded to the localizer registry
    pub localizer: LocalizerSettings,
}

impl Default for SegmentationConfig {
    fn default() -> SegmentationConfig {
        SegmentationConfig {
            resolution: DEFAULT_SEGMENT_RESOLUTION_M,
            localizer: LocalizerSettings::default(),
        }
    }
}

/// The per-instrument ingest configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Multiplicative rescale of numeric source fields (unit
    /// conversions), applied before storage
    #[serde(default)]
    pub scale_factors: BTreeMap<String, f64>,

    /// Stored columns to build secondary indices on
    #[serde(default)]
    pub index: Vec<String>,

    /// The metadata table schema
    pub columns: Vec<ColumnSpec>,

    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

impl IngestConfig {
    pub fn from_file(path: &Path) -> Result<IngestConfig, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// What one ingestion run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Metadata rows stored
    pub records: usize,
    /// Records dropped because their localizer or segmentation failed
    pub skipped: usize,
    /// Segments written across all observations
    pub segments: usize,
}

/// Ingest one instrument's parsed metadata rows into `output_dir`:
/// write the metadata table and its indices, segment every record,
/// assign monotonic segment ids from 0 in emission order, and write the
/// segment table and segment tree.
///
/// A record whose localizer raises is logged and dropped; everything
/// else continues. Each artifact is produced at a temporary path and
/// renamed into place, so a concurrent reader sees either the previous
/// complete artifact or the new one. Re-running replaces the artifacts.
pub fn ingest(
    instrument: &str,
    rows: &[Metadata],
    config: &IngestConfig,
    registry: &Registry,
    output_dir: &Path,
) -> Result<IngestSummary, Error> {
    // Metadata table first: segmentation runs over the stored records,
    // after column mapping and rescaling, as a query would see them
    let metadata_path = output_dir.join(format!("{instrument}{METADATA_DB_SUFFIX}"));
    let metadata_tmp = temp_sibling(&metadata_path);

    let columns: Vec<(String, String)> = config
        .columns
        .iter()
        .map(|c| (c.stored().to_string(), c.sql_type().to_string()))
        .collect();
    let store = MetadataStore::create(&metadata_tmp, &columns)?;

    let mut stored_records = Vec::with_capacity(rows.len());
    let mut table_rows = Vec::with_capacity(rows.len());
    for record in rows {
        let mut stored = Metadata::new(instrument);
        let mut table_row = Vec::with_capacity(config.columns.len());
        for spec in &config.columns {
            let value = record
                .get(spec.source())
                .ok_or_else(|| Error::MissingField(spec.source().to_string()))?;
            let value = match config.scale_factors.get(spec.source()) {
                Some(factor) => {
                    let number = value.as_real().ok_or_else(|| {
                        Error::BadParam(spec.source().to_string(), format!("{value:?}"))
                    })?;
                    Value::Real(number * factor)
                }
                None => value.clone(),
            };
            stored.insert(spec.stored(), value.clone());
            table_row.push(value);
        }
        stored_records.push(stored);
        table_rows.push(table_row);
    }

    store.insert_rows(&table_rows)?;
    for column in &config.index {
        info!("creating index on '{column}'");
        store.create_index(column)?;
    }

    // Segment every record; failures drop the record, never the run
    let mut observation_ids: Vec<String> = Vec::new();
    let mut segments = Vec::new();
    let mut skipped = 0;
    for record in &stored_records {
        let segmented = registry
            .localizer(record, &config.segmentation.localizer)
            .and_then(|localizer| {
                segment_footprint(localizer.as_ref(), config.segmentation.resolution)
            });
        match segmented {
            Ok(footprint) => {
                let observation_id = record.observation_id()?.to_string();
                for segment in footprint {
                    observation_ids.push(observation_id.clone());
                    segments.push(segment);
                }
            }
            Err(cause) => {
                let observation_id = record
                    .observation_id()
                    .unwrap_or("<unknown>")
                    .to_string();
                warn!(
                    "{}",
                    Error::Segmenter(observation_id, Box::new(cause))
                );
                skipped += 1;
            }
        }
    }

    // Segment table: ids are positions in emission order
    let segment_path = output_dir.join(format!("{instrument}{SEGMENT_DB_SUFFIX}"));
    let segment_tmp = temp_sibling(&segment_path);
    let segment_store = SegmentStore::create(&segment_tmp)?;
    segment_store.insert(
        segments
            .iter()
            .enumerate()
            .map(|(id, segment)| (id, observation_ids[id].as_str(), segment)),
    )?;

    // Tree last; its save is already temp-and-rename
    let tree_path = output_dir.join(format!("{instrument}{SEGMENT_TREE_SUFFIX}"));
    SegmentTree::build(&segments).save(&tree_path)?;

    std::fs::rename(&segment_tmp, &segment_path)?;
    std::fs::rename(&metadata_tmp, &metadata_path)?;

    let summary = IngestSummary {
        records: rows.len(),
        skipped,
        segments: segments.len(),
    };
    info!(
        "ingested '{instrument}': {} records ({} skipped), {} segments",
        summary.records, summary.skipped, summary.segments
    );
    Ok(summary)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ----- T E S T S ---------------------------------------------------------------------
