//! The query engine: discovers per-instrument artifacts in a data
//! directory and answers the three catalog questions (metadata
//! predicates, point coverage, footprint overlap).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::Error;
use crate::metadata::{
    METADATA_DB_SUFFIX, Metadata, SEGMENT_DB_SUFFIX, SEGMENT_TREE_SUFFIX,
};
use crate::segment::PointQuery;
use crate::store::{MetadataStore, Predicate, SegmentStore};
use crate::tree::SegmentTree;

/// Environment variable naming the artifact directory
pub const DATA_DIR_VAR: &str = "TERRADEX_DATA_DIR";

#[derive(Debug)]
struct Instrument {
    metadata: MetadataStore,
    // Both spatial artifacts or neither; an instrument can be ingested
    // metadata-only
    segments: Option<SegmentStore>,
    tree_path: Option<PathBuf>,
    tree: OnceCell<SegmentTree>,
}

/// A read handle on one artifact directory.
///
/// Segment trees load lazily on first spatial query per instrument and
/// are then held immutably for the life of the catalog; the tables are
/// read through short-lived connections per call. All methods take
/// `&self`, so one catalog serves concurrent callers without locking.
#[derive(Debug)]
pub struct Catalog {
    instruments: BTreeMap<String, Instrument>,
}

impl Catalog {
    /// Open the artifact directory: the explicit path if given, else the
    /// `TERRADEX_DATA_DIR` environment variable, else a `terradex`
    /// directory under the platform data directory.
    pub fn open(data_dir: Option<&Path>) -> Result<Catalog, Error> {
        let dir = resolve_data_dir(data_dir)?;
        if !dir.is_dir() {
            return Err(Error::Invalid(format!(
                "data directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut instruments = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(instrument) = name.strip_suffix(METADATA_DB_SUFFIX) else {
                continue;
            };

            let segment_db = dir.join(format!("{instrument}{SEGMENT_DB_SUFFIX}"));
            let tree_file = dir.join(format!("{instrument}{SEGMENT_TREE_SUFFIX}"));
            let spatial = segment_db.is_file() && tree_file.is_file();
            debug!(
                "catalog: instrument '{instrument}' (spatial index: {})",
                if spatial { "yes" } else { "no" }
            );

            instruments.insert(
                instrument.to_string(),
                Instrument {
                    metadata: MetadataStore::open(&path),
                    segments: spatial.then(|| SegmentStore::open(&segment_db)),
                    tree_path: spatial.then_some(tree_file),
                    tree: OnceCell::new(),
                },
            );
        }

        info!(
            "catalog: {} instruments under '{}'",
            instruments.len(),
            dir.display()
        );
        Ok(Catalog { instruments })
    }

    /// The discovered instruments, sorted by name
    #[must_use]
    pub fn instruments(&self) -> Vec<&str> {
        self.instruments.keys().map(String::as_str).collect()
    }

    /// Stream all metadata records of `instrument` matching the
    /// conjunction of `predicates`
    pub fn query(
        &self,
        instrument: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Metadata>, Error> {
        let inst = self.instrument(instrument)?;
        inst.metadata.query(instrument, predicates)
    }

    /// All metadata records under the given observation ids; an
    /// observation with several products yields several records
    pub fn query_by_observation_id(
        &self,
        instrument: &str,
        observation_ids: &[&str],
    ) -> Result<Vec<Metadata>, Error> {
        let inst = self.instrument(instrument)?;
        inst.metadata
            .query_by_observation_id(instrument, observation_ids)
    }

    /// Observations of `instrument` whose footprint contains the given
    /// position, or passes within `radius_m` of it. Results are sorted
    /// lexicographically.
    pub fn find_observations_of_latlon(
        &self,
        instrument: &str,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<Vec<String>, Error> {
        let query = PointQuery::new(lat, lon, radius_m)?;
        let inst = self.instrument(instrument)?;
        let (segments, tree) = self.spatial(instrument, inst)?;

        let candidate_ids = tree.query_point(&query);
        debug!(
            "latlon query ({lat}, {lon}, {radius_m}): {} candidate segments",
            candidate_ids.len()
        );

        let mut accepted = BTreeSet::new();
        for (observation_id, segment) in segments.segments_by_ids(&candidate_ids)? {
            if accepted.contains(&observation_id) {
                continue;
            }
            if segment.includes_point(&query) {
                accepted.insert(observation_id);
            }
        }
        Ok(accepted.into_iter().collect())
    }

    /// Observations of `other_instrument` whose footprints overlap the
    /// given observation of `instrument`. Results are sorted
    /// lexicographically.
    pub fn find_overlapping_observations(
        &self,
        instrument: &str,
        observation_id: &str,
        other_instrument: &str,
    ) -> Result<Vec<String>, Error> {
        let inst = self.instrument(instrument)?;
        let (own_segments, _) = self.spatial(instrument, inst)?;

        let other = self.instrument(other_instrument)?;
        let (other_segments, other_tree) = self.spatial(other_instrument, other)?;

        let mut accepted = BTreeSet::new();
        for segment in own_segments.segments_for_observation(observation_id)? {
            let candidate_ids = other_tree.query_segment(&segment);
            for (other_id, other_segment) in other_segments.segments_by_ids(&candidate_ids)? {
                if accepted.contains(&other_id) {
                    continue;
                }
                if segment.overlaps_segment(&other_segment) {
                    accepted.insert(other_id);
                }
            }
        }
        Ok(accepted.into_iter().collect())
    }

    fn instrument(&self, name: &str) -> Result<&Instrument, Error> {
        self.instruments
            .get(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))
    }

    // The segment store and (lazily loaded) segment tree of an
    // instrument, or NoSpatialIndex if it was ingested metadata-only
    fn spatial<'a>(
        &self,
        name: &str,
        inst: &'a Instrument,
    ) -> Result<(&'a SegmentStore, &'a SegmentTree), Error> {
        let (Some(segments), Some(tree_path)) = (&inst.segments, &inst.tree_path) else {
            return Err(Error::NoSpatialIndex(name.to_string()));
        };
        let tree = inst.tree.get_or_try_init(|| {
            info!("loading segment tree for '{name}'");
            SegmentTree::load(tree_path)
        })?;
        Ok((segments, tree))
    }
}

fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf, Error> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_VAR) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(mut dir) = dirs::data_local_dir() {
        dir.push("terradex");
        if dir.is_dir() {
            return Ok(dir);
        }
    }
    Err(Error::Invalid(format!(
        "no data directory given and {DATA_DIR_VAR} is not set"
    )))
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::LatLon;
    use crate::metadata::Value;
    use crate::segment::TriSegment;
    use crate::tree::SegmentTree;

    fn sliver(lat: f64, lon: f64) -> TriSegment {
        TriSegment::new(
            LatLon::new(lat + 2., lon + 1.),
            LatLon::new(lat + 2., lon - 1.),
            LatLon::new(lat - 2., lon - 1.),
        )
        .unwrap()
    }

    fn crossing_sliver(lat: f64, lon: f64) -> TriSegment {
        TriSegment::new(
            LatLon::new(lat + 1., lon + 2.),
            LatLon::new(lat + 1., lon - 2.),
            LatLon::new(lat - 1., lon - 2.),
        )
        .unwrap()
    }

    // Three synthetic single-segment observations: A and B crossing the
    // origin, C at 90 E
    fn write_artifacts(dir: &Path, instrument: &str) -> Result<(), Error> {
        let columns = vec![
            ("observation_id".to_string(), "TEXT".to_string()),
            ("lines".to_string(), "INTEGER".to_string()),
        ];
        let store = MetadataStore::create(
            &dir.join(format!("{instrument}{METADATA_DB_SUFFIX}")),
            &columns,
        )?;
        store.insert_rows(&[
            vec![Value::Text("A".into()), Value::Int(100)],
            vec![Value::Text("B".into()), Value::Int(200)],
            vec![Value::Text("C".into()), Value::Int(300)],
        ])?;

        let segments = [sliver(0., 0.), crossing_sliver(0., 0.), sliver(0., 90.)];
        let names = ["A", "B", "C"];
        let seg_store =
            SegmentStore::create(&dir.join(format!("{instrument}{SEGMENT_DB_SUFFIX}")))?;
        seg_store.insert(
            segments
                .iter()
                .enumerate()
                .map(|(i, s)| (i, names[i], s)),
        )?;

        SegmentTree::build(&segments)
            .save(&dir.join(format!("{instrument}{SEGMENT_TREE_SUFFIX}")))?;
        Ok(())
    }

    #[test]
    fn discovery_and_lookup() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_artifacts(dir.path(), "ctx")?;
        write_artifacts(dir.path(), "hirise_rdr")?;

        let catalog = Catalog::open(Some(dir.path()))?;
        assert_eq!(catalog.instruments(), vec!["ctx", "hirise_rdr"]);

        assert!(matches!(
            catalog.query("sharad", &[]),
            Err(Error::UnknownInstrument(_))
        ));
        Ok(())
    }

    #[test]
    fn metadata_queries() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_artifacts(dir.path(), "ctx")?;
        let catalog = Catalog::open(Some(dir.path()))?;

        let all = catalog.query("ctx", &[])?;
        assert_eq!(all.len(), 3);

        let some = catalog.query(
            "ctx",
            &[Predicate::new("lines", ">=", Value::Int(200))?],
        )?;
        assert_eq!(some.len(), 2);

        let by_id = catalog.query_by_observation_id("ctx", &["B", "A"])?;
        assert_eq!(by_id.len(), 2);
        Ok(())
    }

    #[test]
    fn point_coverage() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_artifacts(dir.path(), "ctx")?;
        let catalog = Catalog::open(Some(dir.path()))?;

        // The origin lies on A and B but not C
        let found = catalog.find_observations_of_latlon("ctx", 0., 0., 0.)?;
        assert_eq!(found, vec!["A".to_string(), "B".to_string()]);

        // 90 E lies on C only
        let found = catalog.find_observations_of_latlon("ctx", 0., 90., 0.)?;
        assert_eq!(found, vec!["C".to_string()]);

        // Far from everything
        let found = catalog.find_observations_of_latlon("ctx", -60., -120., 0.)?;
        assert!(found.is_empty());
        Ok(())
    }

    #[test]
    fn point_coverage_is_deterministic() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_artifacts(dir.path(), "ctx")?;
        let catalog = Catalog::open(Some(dir.path()))?;

        let first = catalog.find_observations_of_latlon("ctx", 0., 0., 0.)?;
        for _ in 0..3 {
            assert_eq!(
                catalog.find_observations_of_latlon("ctx", 0., 0., 0.)?,
                first
            );
        }
        Ok(())
    }

    #[test]
    fn overlap_across_instruments() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_artifacts(dir.path(), "ctx")?;
        write_artifacts(dir.path(), "hirise_rdr")?;
        let catalog = Catalog::open(Some(dir.path()))?;

        // A crosses B at the origin; C is far away. The observation ids
        // come back sorted.
        let found =
            catalog.find_overlapping_observations("ctx", "A", "hirise_rdr")?;
        assert_eq!(found, vec!["A".to_string(), "B".to_string()]);

        let found =
            catalog.find_overlapping_observations("ctx", "C", "hirise_rdr")?;
        assert_eq!(found, vec!["C".to_string()]);
        Ok(())
    }

    #[test]
    fn metadata_only_instrument_has_no_spatial_index() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let columns = vec![("observation_id".to_string(), "TEXT".to_string())];
        MetadataStore::create(
            &dir.path().join(format!("moc{METADATA_DB_SUFFIX}")),
            &columns,
        )?;

        let catalog = Catalog::open(Some(dir.path()))?;
        assert!(catalog.query("moc", &[]).is_ok());
        assert!(matches!(
            catalog.find_observations_of_latlon("moc", 0., 0., 0.),
            Err(Error::NoSpatialIndex(_))
        ));
        assert!(matches!(
            catalog.find_overlapping_observations("moc", "X", "moc"),
            Err(Error::NoSpatialIndex(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(Catalog::open(Some(Path::new("/definitely/not/here"))).is_err());
    }
}
