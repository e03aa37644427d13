//! Conversions between geographic and unit-sphere Cartesian coordinates,
//! and great-circle distances.

use crate::Error;
use crate::coordinate::{LatLon, Vec3};

// Below this, a vector has no usable direction
pub(crate) const NORM_EPSILON: f64 = 1e-12;

/// The unit vector pointing at `latlon`:
/// `(cos φ cos λ, cos φ sin λ, sin φ)`
#[must_use]
pub fn latlon_to_unit(latlon: LatLon) -> Vec3 {
    let [lat, lon] = latlon.to_radians();
    let (latsin, latcos) = lat.sin_cos();
    let (lonsin, loncos) = lon.sin_cos();
    Vec3([latcos * loncos, latcos * lonsin, latsin])
}

/// The geographic position under `v`, which need not have unit norm.
/// Longitude comes out in (−180, 180]. A (near-)zero vector points
/// nowhere and is rejected as [`Error::Degenerate`].
pub fn unit_to_latlon(v: Vec3) -> Result<LatLon, Error> {
    let norm = v.norm();
    if norm < NORM_EPSILON {
        return Err(Error::Degenerate("zero-norm direction vector"));
    }
    let lat = (v[2] / norm).asin();
    let lon = v[1].atan2(v[0]);
    Ok(LatLon::from_radians(lat, lon).normalized())
}

/// The haversine central angle between two `[latitude, longitude]`
/// positions given in radians
#[must_use]
pub fn haversine(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dlat = b[0] - a[0];
    let dlon = b[1] - a[1];
    let h = (dlat / 2.).sin().powi(2) + a[0].cos() * b[0].cos() * (dlon / 2.).sin().powi(2);
    2. * h.sqrt().min(1.).asin()
}

/// Great-circle distance in meters between two positions in degrees,
/// on a sphere of the given radius
#[must_use]
pub fn geodesic_distance(a: LatLon, b: LatLon, radius_m: f64) -> f64 {
    radius_m * haversine(a.to_radians(), b.to_radians())
}

// ----- T E S T S ---------------------------------------------------
