use terradex::authoring::*;
use terradex::ingest::{IngestConfig, ingest};

// ----- U S E R   P R O V I D E D   L O C A L I Z E R ------------------------------

// A four-corner localizer registered for a made-up instrument, built
// from corner fields with a nonstandard naming scheme. Since the
// integration tests in the "tests" directory of a crate are handled as
// independent crates, this constructor could just as well have been
// built entirely outside of the terradex source tree; it demonstrates
// that a user provided localizer takes part in ingestion and querying
// exactly like a builtin.

fn quadcam(
    metadata: &Metadata,
    _settings: &LocalizerSettings,
) -> Result<Box<dyn Localizer>, Error> {
    let corner = |name: &str| -> Result<LatLon, Error> {
        Ok(LatLon::new(
            metadata.real(&format!("{name}_lat"))?,
            metadata.real(&format!("{name}_lon"))?,
        ))
    };
    let corners = [
        corner("ul")?,
        corner("ll")?,
        corner("lr")?,
        corner("ur")?,
    ];
    let localizer = terradex::localizer::FourCornerLocalizer::new(corners, None)?;
    Ok(Box::new(localizer))
}

fn quadcam_record(id: &str, lat: f64, lon: f64) -> Metadata {
    // A ~120 km square footprint centered on (lat, lon)
    let d = 1.;
    Metadata::from_pairs(
        "quadcam",
        [
            ("product_name", Value::Text(id.to_string())),
            ("ul_lat", Value::Real(lat + d)),
            ("ul_lon", Value::Real(lon - d)),
            ("ll_lat", Value::Real(lat - d)),
            ("ll_lon", Value::Real(lon - d)),
            ("lr_lat", Value::Real(lat - d)),
            ("lr_lon", Value::Real(lon + d)),
            ("ur_lat", Value::Real(lat + d)),
            ("ur_lon", Value::Real(lon + d)),
        ],
    )
}

fn quadcam_config() -> IngestConfig {
    // product_name stands in for the missing observation id
    serde_json::from_str(
        r#"{
            "columns": [
                ["product_name", "observation_id", "TEXT"],
                ["ul_lat", "ul_lat", "REAL"], ["ul_lon", "ul_lon", "REAL"],
                ["ll_lat", "ll_lat", "REAL"], ["ll_lon", "ll_lon", "REAL"],
                ["lr_lat", "lr_lat", "REAL"], ["lr_lon", "lr_lon", "REAL"],
                ["ur_lat", "ur_lat", "REAL"], ["ur_lon", "ur_lon", "REAL"]
            ],
            "index": ["observation_id"],
            "segmentation": {"resolution": 30000.0}
        }"#,
    )
    .unwrap()
}

#[test]
fn user_localizer_through_the_whole_pipeline() -> Result<(), Error> {
    let mut registry = Registry::new();
    registry.register("quadcam", LocalizerConstructor(quadcam));

    let dir = tempfile::tempdir()?;
    let records = [
        quadcam_record("Q-001", 10., 40.),
        quadcam_record("Q-002", 10.5, 40.5),
        quadcam_record("Q-003", -30., -120.),
    ];
    let summary = ingest("quadcam", &records, &quadcam_config(), &registry, dir.path())?;
    assert_eq!(summary.records, 3);
    assert_eq!(summary.skipped, 0);
    // 2 x ceil(120 km / 30 km)^2 triangles per record
    assert_eq!(summary.segments, 3 * 2 * 4 * 4);

    let catalog = Catalog::open(Some(dir.path()))?;
    assert_eq!(catalog.instruments(), vec!["quadcam"]);

    // Point coverage: the overlap zone sees both northern footprints
    let found = catalog.find_observations_of_latlon("quadcam", 10.2, 40.2, 0.)?;
    assert_eq!(found, vec!["Q-001".to_string(), "Q-002".to_string()]);

    // Overlap against itself: neighbors overlap, the antipodal-ish one
    // stands alone
    let found = catalog.find_overlapping_observations("quadcam", "Q-001", "quadcam")?;
    assert_eq!(found, vec!["Q-001".to_string(), "Q-002".to_string()]);
    let found = catalog.find_overlapping_observations("quadcam", "Q-003", "quadcam")?;
    assert_eq!(found, vec!["Q-003".to_string()]);

    // The substitute key is queryable like a native observation id
    let records = catalog.query_by_observation_id("quadcam", &["Q-002"])?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].observation_id()?, "Q-002");
    Ok(())
}
