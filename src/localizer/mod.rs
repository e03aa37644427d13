//! Per-instrument mappings between pixel space and the target body.
//!
//! A localizer answers two questions about one observation: where on the
//! body is pixel `(row, col)`, and which pixel covers a given position.
//! Instruments provide wildly different geometry metadata, so each
//! instrument registers a constructor that builds the appropriate variant
//! from a metadata record. Lookup is by the record's instrument tag.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::Error;
use crate::body::MARS_RADIUS_M;
use crate::coordinate::LatLon;
use crate::math::sphere::geodesic_distance;
use crate::metadata::Metadata;

pub mod four_corner;
pub mod geodesic;
pub mod map;
mod simplex;

pub use four_corner::FourCornerLocalizer;
pub use geodesic::GeodesicLocalizer;
pub use map::{BrowseLocalizer, MapLocalizer, HIRISE_BROWSE_WIDTH};

/// Ground tolerance, in meters, at which the derived pixel lookup stops
pub const DEFAULT_RESOLUTION_M: f64 = 0.1;

/// Pixel tolerance at which the derived pixel lookup stops
const PIXEL_TOLERANCE: f64 = 0.1;

// ----- T H E   L O C A L I Z E R   T R A I T -----------------------------------------

/// The capability set every localizer provides. `pixel_to_latlon` is
/// total over the pixel domain; `latlon_to_pixel` is either analytic
/// (map-projected variants override it) or derived here by numerical
/// minimization of the geodesic distance to the probe.
pub trait Localizer {
    /// The position under pixel `(row, col)`. Fractional pixels are
    /// meaningful; longitude comes out in (−180, 180].
    fn pixel_to_latlon(&self, row: f64, col: f64) -> Result<LatLon, Error>;

    /// The pixel covering `point`. The default implementation runs a
    /// Nelder–Mead simplex over the geodesic distance between
    /// `pixel_to_latlon(u)` and the probe, seeded at the center of the
    /// pixel domain, and stops at [`DEFAULT_RESOLUTION_M`] meters or 0.1
    /// pixel, whichever binds later.
    fn latlon_to_pixel(&self, point: LatLon) -> Result<(f64, f64), Error> {
        let radius = self.body_radius_m();
        let rows = self.rows();
        let cols = self.cols();
        let seed = [rows / 2., cols / 2.];
        let step = [rows / 4., cols / 4.];
        let best = simplex::minimize(
            |u| Ok(geodesic_distance(self.pixel_to_latlon(u[0], u[1])?, point, radius)),
            seed,
            step,
            PIXEL_TOLERANCE,
            self.resolution_m(),
        )?;
        Ok((best[0], best[1]))
    }

    /// Across-track extent of the observation, in meters
    fn observation_width_m(&self) -> f64;

    /// Along-track extent of the observation, in meters
    fn observation_length_m(&self) -> f64;

    /// Upper row bound of the pixel domain `[0, rows] × [0, cols]`
    /// (1 under normalized pixel space)
    fn rows(&self) -> f64;

    /// Upper column bound of the pixel domain
    fn cols(&self) -> f64;

    /// True when the pixel domain is the unit square rather than image
    /// row/column counts
    fn normalized_pixel_space(&self) -> bool {
        false
    }

    /// Sense of the along-track pixel axis relative to the flight
    /// geodesic; decides triangle winding during segmentation
    fn flight_direction(&self) -> i8 {
        1
    }

    /// Radius of the reference sphere for distance objectives
    fn body_radius_m(&self) -> f64 {
        MARS_RADIUS_M
    }

    /// Ground tolerance for the derived pixel lookup
    fn resolution_m(&self) -> f64 {
        DEFAULT_RESOLUTION_M
    }
}

// ----- S E T T I N G S ---------------------------------------------------------------

/// Caller-side localizer selection knobs, forwarded from the ingest
/// configuration (`segmentation.localizer`). Only the HiRISE RDR
/// constructor currently reads them: `nomap` selects the four-corner
/// footprint localizer over the map-projected one, `browse` wraps the
/// map localizer to browse-image pixel scale.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalizerSettings {
    pub nomap: bool,
    pub browse: bool,
    pub browse_width: u32,
}

impl Default for LocalizerSettings {
    fn default() -> LocalizerSettings {
        LocalizerSettings {
            nomap: false,
            browse: false,
            browse_width: HIRISE_BROWSE_WIDTH,
        }
    }
}

// ----- T H E   R E G I S T R Y -------------------------------------------------------

// Install new builtin localizers by adding them in the module list above
// and the `BUILTIN_LOCALIZERS` block below

#[rustfmt::skip]
const BUILTIN_LOCALIZERS: [(&str, LocalizerConstructor); 5] = [
    ("ctx",        LocalizerConstructor(geodesic::ctx)),
    ("hirise_rdr", LocalizerConstructor(map::hirise_rdr)),
    ("moc",        LocalizerConstructor(geodesic::moc)),
    ("themis_ir",  LocalizerConstructor(geodesic::themis)),
    ("themis_vis", LocalizerConstructor(geodesic::themis)),
];

/// Blueprint for the instantiation of a localizer from a metadata record.
///
/// LocalizerConstructor needs to be a newtype, rather than a type alias,
/// since we must implement the Debug-trait for LocalizerConstructor (to
/// make auto derive of the Debug-trait work for any derived type).
pub struct LocalizerConstructor(
    pub fn(metadata: &Metadata, settings: &LocalizerSettings) -> Result<Box<dyn Localizer>, Error>,
);

// Cannot autoderive the Debug trait
impl core::fmt::Debug for LocalizerConstructor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LocalizerConstructor")
    }
}

/// The localizer registration table: builtins at construction, runtime
/// registrations via [`register`](Registry::register). Populate once at
/// startup and treat as read-only afterward.
#[derive(Debug)]
pub struct Registry {
    constructors: BTreeMap<String, LocalizerConstructor>,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Registry {
        let mut constructors = BTreeMap::new();
        for (name, constructor) in BUILTIN_LOCALIZERS {
            constructors.insert(String::from(name), LocalizerConstructor(constructor.0));
        }
        Registry { constructors }
    }

    /// Register a localizer constructor for an instrument, replacing any
    /// previous registration under the same tag
    pub fn register(&mut self, instrument: &str, constructor: LocalizerConstructor) {
        self.constructors
            .insert(String::from(instrument), constructor);
    }

    /// Instantiate the localizer for a metadata record
    pub fn localizer(
        &self,
        metadata: &Metadata,
        settings: &LocalizerSettings,
    ) -> Result<Box<dyn Localizer>, Error> {
        let Some(constructor) = self.constructors.get(metadata.instrument()) else {
            return Err(Error::NoLocalizer(metadata.instrument().to_string()));
        };
        (constructor.0)(metadata, settings)
    }
}

// ----- T E S T S ---------------------------------------------------------------------
