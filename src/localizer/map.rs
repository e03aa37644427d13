//! Localization for map-projected products, where the pixel grid is a
//! regular grid in projection coordinates and both directions of the
//! mapping are analytic.

use crate::Error;
use crate::body::{MARS_RADIUS_EQUATORIAL_M, MARS_RADIUS_POLAR_M};
use crate::coordinate::LatLon;
use crate::localizer::four_corner::FourCornerLocalizer;
use crate::localizer::{Localizer, LocalizerSettings};
use crate::metadata::Metadata;

use std::f64::consts::FRAC_PI_2;
use std::f64::consts::FRAC_PI_4;

/// Width in pixels of the reduced-resolution browse products
pub const HIRISE_BROWSE_WIDTH: u32 = 2048;

/// The map projections appearing in the supported cumulative indexes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Equirectangular,
    /// Either hemisphere; selected by the sign of the projection center
    /// latitude
    PolarStereographic,
}

impl Projection {
    pub fn parse(name: &str) -> Result<Projection, Error> {
        match name {
            "EQUIRECTANGULAR" => Ok(Projection::Equirectangular),
            "POLAR STEREOGRAPHIC" => Ok(Projection::PolarStereographic),
            other => Err(Error::UnsupportedProjection(other.to_string())),
        }
    }
}

/// Projection-grid localizer. Projection coordinates relate to pixels by
/// `x = (col − sample_offset) · scale`, `y = −(row − line_offset) ·
/// scale`, with the projection formulas of the product label's
/// projection type on the configured body radii.
#[derive(Clone, Copy, Debug)]
pub struct MapLocalizer {
    projection: Projection,
    center_lat: f64, // radians
    center_lon: f64, // radians
    scale: f64,      // meters per pixel
    line_offset: f64,
    sample_offset: f64,
    lines: f64,
    samples: f64,
    radius_polar: f64,
    radius_equatorial: f64,
}

#[allow(clippy::too_many_arguments)]
impl MapLocalizer {
    /// `center_lat`/`center_lon` in radians; offsets in pixels; `scale`
    /// in meters per pixel. Body radii default to Mars; see
    /// [`with_radii`](Self::with_radii).
    pub fn new(
        projection: &str,
        center_lat: f64,
        center_lon: f64,
        scale: f64,
        line_offset: f64,
        sample_offset: f64,
        lines: f64,
        samples: f64,
    ) -> Result<MapLocalizer, Error> {
        if scale <= 0. {
            return Err(Error::Invalid("non-positive map scale".to_string()));
        }
        Ok(MapLocalizer {
            projection: Projection::parse(projection)?,
            center_lat,
            center_lon,
            scale,
            line_offset,
            sample_offset,
            lines,
            samples,
            radius_polar: MARS_RADIUS_POLAR_M,
            radius_equatorial: MARS_RADIUS_EQUATORIAL_M,
        })
    }

    /// The same localizer on another body of revolution
    #[must_use]
    pub fn with_radii(mut self, polar_m: f64, equatorial_m: f64) -> MapLocalizer {
        self.radius_polar = polar_m;
        self.radius_equatorial = equatorial_m;
        self
    }

    // Radius of the equirectangular sphere: the local radius of the
    // biaxial body at the projection center latitude
    fn local_radius(&self) -> f64 {
        let (latsin, latcos) = self.center_lat.sin_cos();
        self.radius_polar * self.radius_equatorial
            / ((self.radius_polar * latcos).hypot(self.radius_equatorial * latsin))
    }

    // Pixel to projection coordinates, in meters
    fn projection_xy(&self, row: f64, col: f64) -> (f64, f64) {
        (
            (col - self.sample_offset) * self.scale,
            -(row - self.line_offset) * self.scale,
        )
    }

    // Projection coordinates to pixel
    fn pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.line_offset - y / self.scale,
            self.sample_offset + x / self.scale,
        )
    }
}

// Fold an angle in radians into (-pi, pi]
fn fold(angle: f64) -> f64 {
    let folded = angle.rem_euclid(2. * std::f64::consts::PI);
    if folded > std::f64::consts::PI {
        return folded - 2. * std::f64::consts::PI;
    }
    folded
}

impl Localizer for MapLocalizer {
    fn pixel_to_latlon(&self, row: f64, col: f64) -> Result<LatLon, Error> {
        let (x, y) = self.projection_xy(row, col);

        let (lat, lon) = match self.projection {
            Projection::Equirectangular => {
                let r = self.local_radius();
                (y / r, self.center_lon + x / (r * self.center_lat.cos()))
            }
            Projection::PolarStereographic => {
                let r = self.radius_polar;
                let rho = x.hypot(y);
                if self.center_lat >= 0. {
                    let lat = FRAC_PI_2 - 2. * (rho / (2. * r)).atan();
                    (lat, self.center_lon + x.atan2(-y))
                } else {
                    let lat = -FRAC_PI_2 + 2. * (rho / (2. * r)).atan();
                    (lat, self.center_lon + x.atan2(y))
                }
            }
        };

        Ok(LatLon::from_radians(lat, lon).normalized())
    }

    fn latlon_to_pixel(&self, point: LatLon) -> Result<(f64, f64), Error> {
        let [lat, lon] = point.to_radians();
        let dlon = fold(lon - self.center_lon);

        let (x, y) = match self.projection {
            Projection::Equirectangular => {
                let r = self.local_radius();
                (dlon * r * self.center_lat.cos(), lat * r)
            }
            Projection::PolarStereographic => {
                let r = self.radius_polar;
                if self.center_lat >= 0. {
                    let rho = 2. * r * (FRAC_PI_4 - lat / 2.).tan();
                    (rho * dlon.sin(), -rho * dlon.cos())
                } else {
                    let rho = 2. * r * (FRAC_PI_4 + lat / 2.).tan();
                    (rho * dlon.sin(), rho * dlon.cos())
                }
            }
        };

        Ok(self.pixel(x, y))
    }

    fn observation_width_m(&self) -> f64 {
        self.scale * self.samples
    }

    fn observation_length_m(&self) -> f64 {
        self.scale * self.lines
    }

    fn rows(&self) -> f64 {
        self.lines
    }

    fn cols(&self) -> f64 {
        self.samples
    }
}

// ----- B R O W S E   W R A P P E R ---------------------------------------------------

/// Uniform pixel rescaling between a reduced-resolution browse image and
/// the full map-projected product; both mapping directions delegate
#[derive(Clone, Copy, Debug)]
pub struct BrowseLocalizer {
    inner: MapLocalizer,
    factor: f64,
}

impl BrowseLocalizer {
    pub fn new(inner: MapLocalizer, browse_width: u32) -> Result<BrowseLocalizer, Error> {
        if browse_width == 0 {
            return Err(Error::BadParam(
                "browse_width".to_string(),
                browse_width.to_string(),
            ));
        }
        Ok(BrowseLocalizer {
            inner,
            factor: f64::from(browse_width) / inner.samples,
        })
    }
}

impl Localizer for BrowseLocalizer {
    fn pixel_to_latlon(&self, row: f64, col: f64) -> Result<LatLon, Error> {
        self.inner
            .pixel_to_latlon(row / self.factor, col / self.factor)
    }

    fn latlon_to_pixel(&self, point: LatLon) -> Result<(f64, f64), Error> {
        let (row, col) = self.inner.latlon_to_pixel(point)?;
        Ok((row * self.factor, col * self.factor))
    }

    fn observation_width_m(&self) -> f64 {
        self.inner.observation_width_m()
    }

    fn observation_length_m(&self) -> f64 {
        self.inner.observation_length_m()
    }

    fn rows(&self) -> f64 {
        self.inner.rows() * self.factor
    }

    fn cols(&self) -> f64 {
        self.inner.cols() * self.factor
    }
}

// ----- C O N S T R U C T O R ---------------------------------------------------------

/// MRO HiRISE reduced data records. The default is the map-projected
/// localizer from the label's projection fields; `nomap` selects the
/// four-corner footprint localizer instead (the RDR map grid is
/// north-up, the footprint is the observation parallelogram), and
/// `browse` rescales pixels to the browse product width.
pub fn hirise_rdr(
    metadata: &Metadata,
    settings: &LocalizerSettings,
) -> Result<Box<dyn Localizer>, Error> {
    if settings.nomap {
        let corners = [
            LatLon::new(
                metadata.real("corner1_latitude")?,
                metadata.real("corner1_longitude")?,
            ),
            LatLon::new(
                metadata.real("corner2_latitude")?,
                metadata.real("corner2_longitude")?,
            ),
            LatLon::new(
                metadata.real("corner3_latitude")?,
                metadata.real("corner3_longitude")?,
            ),
            LatLon::new(
                metadata.real("corner4_latitude")?,
                metadata.real("corner4_longitude")?,
            ),
        ];
        let shape = Some((metadata.real("lines")?, metadata.real("samples")?));
        return Ok(Box::new(FourCornerLocalizer::new(corners, shape)?));
    }

    let localizer = MapLocalizer::new(
        metadata.text("map_projection_type")?,
        metadata.real("projection_center_latitude")?.to_radians(),
        metadata.real("projection_center_longitude")?.to_radians(),
        metadata.real("map_scale")?,
        metadata.real("line_projection_offset")?,
        metadata.real("sample_projection_offset")?,
        metadata.real("lines")?,
        metadata.real("samples")?,
    )?;

    if settings.browse {
        return Ok(Box::new(BrowseLocalizer::new(
            localizer,
            settings.browse_width,
        )?));
    }
    Ok(Box::new(localizer))
}

// ----- T E S T S ---------------------------------------------------------------------
