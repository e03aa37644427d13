//! Localization from four footprint corner coordinates, with no other
//! knowledge of the sensor geometry.

use crate::Error;
use crate::body::MARS_RADIUS_M;
use crate::coordinate::{LatLon, Vec3};
use crate::localizer::Localizer;
use crate::math::sphere::{geodesic_distance, latlon_to_unit, unit_to_latlon};

/// Bilinear interpolation between the corner unit vectors, in the order
/// top-left, bottom-left, bottom-right, top-right. When the pixel shape
/// is unknown the domain is the normalized unit square.
///
/// The interpolated chord point is pushed back to the sphere, so the
/// mapping is exact at the corners and accurate to second order in the
/// footprint extent elsewhere.
#[derive(Clone, Copy, Debug)]
pub struct FourCornerLocalizer {
    corners: [Vec3; 4],
    n_rows: f64,
    n_cols: f64,
    normalized: bool,
    width_m: f64,
    length_m: f64,
}

impl FourCornerLocalizer {
    /// `corners` in order (top-left, bottom-left, bottom-right,
    /// top-right); `shape` as `(rows, cols)`, or `None` for normalized
    /// pixel space
    pub fn new(
        corners: [LatLon; 4],
        shape: Option<(f64, f64)>,
    ) -> Result<FourCornerLocalizer, Error> {
        let (n_rows, n_cols) = match shape {
            Some((rows, cols)) => {
                if rows <= 0. {
                    return Err(Error::Invalid("no image rows".to_string()));
                }
                if cols <= 0. {
                    return Err(Error::Invalid("no image columns".to_string()));
                }
                (rows, cols)
            }
            None => (1., 1.),
        };

        let [tl, bl, br, tr] = corners;
        let width_m = (geodesic_distance(tl, tr, MARS_RADIUS_M)
            + geodesic_distance(bl, br, MARS_RADIUS_M))
            / 2.;
        let length_m = (geodesic_distance(tl, bl, MARS_RADIUS_M)
            + geodesic_distance(tr, br, MARS_RADIUS_M))
            / 2.;

        Ok(FourCornerLocalizer {
            corners: [
                latlon_to_unit(tl),
                latlon_to_unit(bl),
                latlon_to_unit(br),
                latlon_to_unit(tr),
            ],
            n_rows,
            n_cols,
            normalized: shape.is_none(),
            width_m,
            length_m,
        })
    }
}

impl Localizer for FourCornerLocalizer {
    fn pixel_to_latlon(&self, row: f64, col: f64) -> Result<LatLon, Error> {
        let fr = row / self.n_rows;
        let fc = col / self.n_cols;
        let [tl, bl, br, tr] = self.corners;

        let top = tl.scale(1. - fc).add(tr.scale(fc));
        let bottom = bl.scale(1. - fc).add(br.scale(fc));
        let chord = top.scale(1. - fr).add(bottom.scale(fr));
        unit_to_latlon(chord)
    }

    fn observation_width_m(&self) -> f64 {
        self.width_m
    }

    fn observation_length_m(&self) -> f64 {
        self.length_m
    }

    fn rows(&self) -> f64 {
        self.n_rows
    }

    fn cols(&self) -> f64 {
        self.n_cols
    }

    fn normalized_pixel_space(&self) -> bool {
        self.normalized
    }
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    // ESP_050016_1870 footprint corners from the cumulative index
    fn hirise_corners() -> [LatLon; 4] {
        [
            LatLon::new(6.9035, 70.0791),
            LatLon::new(6.8934, 69.9971),
            LatLon::new(6.9837, 69.9859),
            LatLon::new(6.9937, 70.068),
        ]
    }

    #[test]
    fn exact_at_corners() -> Result<(), Error> {
        let localizer =
            FourCornerLocalizer::new(hirise_corners(), Some((23798., 22023.)))?;
        assert!(!localizer.normalized_pixel_space());

        let p = localizer.pixel_to_latlon(0., 0.)?;
        assert_float_eq!(p.0, [6.9035, 70.0791], abs_all <= 1e-9);
        let p = localizer.pixel_to_latlon(23798., 0.)?;
        assert_float_eq!(p.0, [6.8934, 69.9971], abs_all <= 1e-9);
        let p = localizer.pixel_to_latlon(23798., 22023.)?;
        assert_float_eq!(p.0, [6.9837, 69.9859], abs_all <= 1e-9);
        let p = localizer.pixel_to_latlon(0., 22023.)?;
        assert_float_eq!(p.0, [6.9937, 70.068], abs_all <= 1e-9);
        Ok(())
    }

    #[test]
    fn interior_interpolates() -> Result<(), Error> {
        let localizer =
            FourCornerLocalizer::new(hirise_corners(), Some((23798., 22023.)))?;
        let center = localizer.pixel_to_latlon(11899., 11011.5)?;
        // The footprint is a ~10 km quadrilateral; its center is close to
        // the mean of the corners
        assert_float_eq!(center.lat(), 6.943575, abs <= 1e-3);
        assert_float_eq!(center.lon(), 70.032525, abs <= 1e-3);
        Ok(())
    }

    #[test]
    fn normalized_domain_roundtrip() -> Result<(), Error> {
        let localizer = FourCornerLocalizer::new(hirise_corners(), None)?;
        assert!(localizer.normalized_pixel_space());
        assert_eq!(localizer.rows(), 1.);

        let target = localizer.pixel_to_latlon(0.25, 0.75)?;
        let (row, col) = localizer.latlon_to_pixel(target)?;
        assert_float_eq!(row, 0.25, abs <= 1e-2);
        assert_float_eq!(col, 0.75, abs <= 1e-2);
        Ok(())
    }

    #[test]
    fn pixel_roundtrip_within_tolerance() -> Result<(), Error> {
        let localizer =
            FourCornerLocalizer::new(hirise_corners(), Some((23798., 22023.)))?;
        let target = localizer.pixel_to_latlon(1000., 18000.)?;
        let (row, col) = localizer.latlon_to_pixel(target)?;
        assert!((row - 1000.).abs() < 5.0);
        assert!((col - 18000.).abs() < 5.0);
        Ok(())
    }

    #[test]
    fn sizes_are_average_edge_lengths() -> Result<(), Error> {
        let localizer = FourCornerLocalizer::new(hirise_corners(), None)?;
        // The footprint is a rotated parallelogram roughly 5.4 x 4.9 km
        assert!((localizer.observation_width_m() - 5_400.).abs() < 100.);
        assert!((localizer.observation_length_m() - 4_900.).abs() < 100.);
        Ok(())
    }

    #[test]
    fn rejects_empty_shape() {
        assert!(FourCornerLocalizer::new(hirise_corners(), Some((0., 10.))).is_err());
        assert!(FourCornerLocalizer::new(hirise_corners(), Some((10., 0.))).is_err());
    }
}
