mod geodesics;

use crate::Error;

/// Mean equatorial radius of Mars, in meters.
/// <https://tharsis.gsfc.nasa.gov/geodesy.html>
pub const MARS_RADIUS_M: f64 = 3_396_200.0;

/// Flattening of the Mars reference ellipsoid
pub const MARS_FLATTENING: f64 = 1.0 / 169.8;

/// Polar radius of Mars, used by the map-projected localizers
pub const MARS_RADIUS_POLAR_M: f64 = 3_376_200.0;

/// Equatorial radius of Mars, used by the map-projected localizers
pub const MARS_RADIUS_EQUATORIAL_M: f64 = 3_396_200.0;

// (name, semimajor axis, reciprocal flattening; 0 selects a sphere)
#[rustfmt::skip]
const BODY_LIST: [(&str, f64, f64); 4] = [
    ("Mars",        MARS_RADIUS_M, 169.8                 ),
    ("Mars-sphere", MARS_RADIUS_M, 0.                    ),
    ("GRS80",       6_378_137.0,   298.257_222_100_882_7 ),
    ("unitsphere",  1.0,           0.                    ),
];

/// A biaxial body of revolution: the reference figure on which geodesic
/// stepping takes place. A flattening of zero gives a sphere, and all
/// geodesic computations specialize exactly to the great-circle case.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    a: f64,
    f: f64,
}

impl Default for Body {
    fn default() -> Body {
        Body::new(MARS_RADIUS_M, MARS_FLATTENING)
    }
}

impl Body {
    /// User defined body
    #[must_use]
    pub fn new(semimajor_axis: f64, flattening: f64) -> Body {
        Body {
            a: semimajor_axis,
            f: flattening,
        }
    }

    /// Predefined body from the builtin list
    pub fn named(name: &str) -> Result<Body, Error> {
        if let Some(&(_, a, rf)) = BODY_LIST.iter().find(|&&body| body.0 == name) {
            let f = if rf != 0.0 { 1.0 / rf } else { rf };
            return Ok(Body::new(a, f));
        }

        Err(Error::BadParam(
            String::from("body"),
            String::from(name),
        ))
    }

    /// The semimajor axis, *a*
    #[must_use]
    pub fn semimajor_axis(&self) -> f64 {
        self.a
    }

    /// The semiminor axis, *b*
    #[must_use]
    pub fn semiminor_axis(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// The flattening, *f = (a - b)/a*
    #[must_use]
    pub fn flattening(&self) -> f64 {
        self.f
    }

    /// The squared eccentricity *e² = (a² - b²) / a²*
    #[must_use]
    pub fn eccentricity_squared(&self) -> f64 {
        self.f * (2_f64 - self.f)
    }

    /// The squared second eccentricity *e'² = (a² - b²) / b² = e² / (1 - e²)*
    #[must_use]
    pub fn second_eccentricity_squared(&self) -> f64 {
        let es = self.eccentricity_squared();
        es / (1.0 - es)
    }

    /// The reduced latitude, β, of the geographic latitude φ (both in
    /// radians): *tan β = (1 - f) tan φ*
    #[must_use]
    pub fn latitude_geographic_to_reduced(&self, latitude: f64) -> f64 {
        ((1.0 - self.f) * latitude.tan()).atan()
    }
}

// ----- T E S T S ---------------------------------------------------
