//! Localization for line-scan instruments described by an observation
//! center, a north azimuth and per-pixel ground pitch.

use crate::Error;
use crate::body::Body;
use crate::coordinate::LatLon;
use crate::localizer::{Localizer, LocalizerSettings};
use crate::metadata::{Metadata, Value};

/// Maps pixels by stepping along the flight geodesic and then
/// perpendicular to it, both with the direct geodesic solution on the
/// configured body.
///
/// The north azimuth is the clockwise angle from the cross-track axis to
/// local north at the observation center, so the flight geodesic leaves
/// the center at azimuth `90 − north_azimuth`. Rows step along the
/// flight line (sign given by the flight direction), columns across it.
#[derive(Clone, Copy, Debug)]
pub struct GeodesicLocalizer {
    body: Body,
    center_row: f64,
    center_col: f64,
    center: LatLon,
    n_rows: f64,
    n_cols: f64,
    pixel_height_m: f64,
    pixel_width_m: f64,
    north_azimuth: f64,
    flight_direction: i8,
}

#[allow(clippy::too_many_arguments)]
impl GeodesicLocalizer {
    pub fn new(
        body: Body,
        center_row: f64,
        center_col: f64,
        center: LatLon,
        n_rows: f64,
        n_cols: f64,
        pixel_height_m: f64,
        pixel_width_m: f64,
        north_azimuth: f64,
        flight_direction: i8,
    ) -> Result<GeodesicLocalizer, Error> {
        if n_rows <= 0. {
            return Err(Error::Invalid("no image rows".to_string()));
        }
        if n_cols <= 0. {
            return Err(Error::Invalid("no image columns".to_string()));
        }
        if pixel_height_m <= 0. {
            return Err(Error::Invalid("non-positive pixel height".to_string()));
        }
        if pixel_width_m <= 0. {
            return Err(Error::Invalid("non-positive pixel width".to_string()));
        }

        Ok(GeodesicLocalizer {
            body,
            center_row,
            center_col,
            center,
            n_rows,
            n_cols,
            pixel_height_m,
            pixel_width_m,
            north_azimuth,
            flight_direction,
        })
    }
}

impl Localizer for GeodesicLocalizer {
    fn pixel_to_latlon(&self, row: f64, col: f64) -> Result<LatLon, Error> {
        let x_m = (col - self.center_col) * self.pixel_width_m;
        let y_m = (row - self.center_row) * self.pixel_height_m * f64::from(self.flight_direction);

        let (along, azimuth_there) =
            self.body
                .geodesic_fwd(self.center, 90. - self.north_azimuth, y_m);
        let (point, _) = self.body.geodesic_fwd(along, azimuth_there - 90., x_m);
        Ok(point)
    }

    fn observation_width_m(&self) -> f64 {
        self.pixel_width_m * self.n_cols
    }

    fn observation_length_m(&self) -> f64 {
        self.pixel_height_m * self.n_rows
    }

    fn rows(&self) -> f64 {
        self.n_rows
    }

    fn cols(&self) -> f64 {
        self.n_cols
    }

    fn flight_direction(&self) -> i8 {
        self.flight_direction
    }

    fn body_radius_m(&self) -> f64 {
        self.body.semimajor_axis()
    }
}

// ----- C O N S T R U C T O R S -------------------------------------------------------

// MOC and CTX cumulative indexes mark some products as flipped along
// track; those observations carry a mirrored north azimuth.
fn effective_azimuth(metadata: &Metadata) -> Result<f64, Error> {
    let azimuth = metadata.real("north_azimuth")?;
    let flipped = matches!(
        metadata.get("usage_note"), Some(Value::Text(note)) if note.trim() == "F"
    );
    if flipped {
        return Ok(180. - azimuth);
    }
    Ok(azimuth)
}

/// MRO Context Camera. Localization reconstructs better on a spherical
/// Mars than on the reference ellipsoid.
pub fn ctx(
    metadata: &Metadata,
    _settings: &LocalizerSettings,
) -> Result<Box<dyn Localizer>, Error> {
    let lines = metadata.real("lines")?;
    let samples = metadata.real("samples")?;
    let localizer = GeodesicLocalizer::new(
        Body::named("Mars-sphere")?,
        lines / 2.,
        samples / 2.,
        LatLon::new(
            metadata.real("center_latitude")?,
            metadata.real("center_longitude")?,
        ),
        lines,
        samples,
        metadata.real("image_height")? / lines,
        metadata.real("image_width")? / samples,
        effective_azimuth(metadata)?,
        -1,
    )?;
    Ok(Box::new(localizer))
}

/// Mars Global Surveyor Mars Orbiter Camera; same geometry and sphere
/// preference as CTX
pub fn moc(
    metadata: &Metadata,
    settings: &LocalizerSettings,
) -> Result<Box<dyn Localizer>, Error> {
    ctx(metadata, settings)
}

/// Mars Odyssey THEMIS (infrared and visible); framing geometry given by
/// pixel width and aspect ratio, on the Mars ellipsoid
pub fn themis(
    metadata: &Metadata,
    _settings: &LocalizerSettings,
) -> Result<Box<dyn Localizer>, Error> {
    let lines = metadata.real("lines")?;
    let samples = metadata.real("samples")?;
    let pixel_width = metadata.real("pixel_width")?;
    let localizer = GeodesicLocalizer::new(
        Body::named("Mars")?,
        lines / 2.,
        samples / 2.,
        LatLon::new(
            metadata.real("center_latitude")?,
            metadata.real("center_longitude")?,
        ),
        lines,
        samples,
        metadata.real("pixel_aspect_ratio")? * pixel_width,
        pixel_width,
        metadata.real("north_azimuth")?,
        1,
    )?;
    Ok(Box::new(localizer))
}

// ----- T E S T S ---------------------------------------------------------------------
