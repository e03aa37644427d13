use super::Body;
use crate::coordinate::LatLon;

// Convergence threshold for the auxiliary-sphere arc, in radians;
// sub-micrometer at planetary radii
const ARC_TOLERANCE: f64 = 1e-12;

impl Body {
    /// The direct geodesic problem: from a point of origin, follow the
    /// geodesic with the given forward azimuth (degrees, clockwise from
    /// north) for the given distance (meters; a negative distance steps
    /// backwards). Returns the destination and the forward azimuth of the
    /// geodesic at the destination, in degrees.
    ///
    /// Solved with Vincenty's formulation (1975, with the 1976 series
    /// coefficients): the geodesic is mapped to a great circle on an
    /// auxiliary sphere through the reduced latitudes, the arc length on
    /// that sphere is found by fixed-point iteration, and the destination
    /// is mapped back with a longitude correction of order the
    /// flattening. At zero flattening the auxiliary sphere is the body
    /// itself, every correction vanishes, and the first iterate is
    /// already the great-circle answer. The convergence trouble Vincenty
    /// has near antipodes afflicts only the inverse problem, not this
    /// direct one.
    #[must_use]
    pub fn geodesic_fwd(&self, from: LatLon, azimuth: f64, distance: f64) -> (LatLon, f64) {
        let [lat1, lon1] = from.to_radians();
        let bearing = azimuth.to_radians();
        let (bearing_sin, bearing_cos) = bearing.sin_cos();
        let f = self.flattening();

        // The origin on the auxiliary sphere
        let reduced1 = self.latitude_geographic_to_reduced(lat1);
        let (reduced1_sin, reduced1_cos) = reduced1.sin_cos();

        // Arc from the great circle's equator crossing to the origin,
        // and the azimuth with which the circle crosses the equator
        // (only its sine and squared cosine are ever needed)
        let equator_arc = reduced1.tan().atan2(bearing_cos);
        let eq_azimuth_sin = reduced1_cos * bearing_sin;
        let eq_azimuth_cos2 = 1. - eq_azimuth_sin * eq_azimuth_sin;

        // Series coefficients in the compact form of the 1976 update
        let root = (1. + eq_azimuth_cos2 * self.second_eccentricity_squared()).sqrt();
        let k = (root - 1.) / (root + 1.);
        let series_a = (1. + k * k / 4.) / (1. - k);
        let series_b = k * (1. - 3. * k * k / 8.);

        // Fixed-point iteration for the arc traveled on the auxiliary
        // sphere: the ellipsoidal distance over b*A, plus a correction
        // that depends on where along the circle the arc sits
        let plain_arc = distance / (self.semiminor_axis() * series_a);
        let mut arc = plain_arc;
        for _ in 0..100 {
            let (arc_sin, arc_cos) = arc.sin_cos();
            // Double the arc from the equator crossing to the midpoint
            let midpoint_cos = (2. * equator_arc + arc).cos();
            let midpoint_cos2 = midpoint_cos * midpoint_cos;
            let correction = series_b
                * arc_sin
                * (midpoint_cos
                    + series_b / 4.
                        * (arc_cos * (2. * midpoint_cos2 - 1.)
                            - series_b / 6.
                                * midpoint_cos
                                * (4. * arc_sin * arc_sin - 3.)
                                * (4. * midpoint_cos2 - 3.)));
            let next = plain_arc + correction;
            let converged = (next - arc).abs() < ARC_TOLERANCE;
            arc = next;
            if converged {
                break;
            }
        }

        // Destination latitude, transferred back from the auxiliary
        // sphere. `across` is the part of the motion that runs against
        // the latitude circles; it reappears in the return azimuth.
        let (arc_sin, arc_cos) = arc.sin_cos();
        let across = reduced1_sin * arc_sin - reduced1_cos * arc_cos * bearing_cos;
        let lat2 = (reduced1_sin * arc_cos + reduced1_cos * arc_sin * bearing_cos)
            .atan2((1. - f) * eq_azimuth_sin.hypot(across));

        // Longitude difference on the sphere, then shrunk by the
        // flattening-dependent correction to land on the ellipsoid
        let sphere_lon = (arc_sin * bearing_sin)
            .atan2(reduced1_cos * arc_cos - reduced1_sin * arc_sin * bearing_cos);
        let midpoint_cos = (2. * equator_arc + arc).cos();
        let shrink = f / 16. * eq_azimuth_cos2 * (4. + f * (4. - 3. * eq_azimuth_cos2));
        let lon_arc = sphere_lon
            - (1. - shrink)
                * f
                * eq_azimuth_sin
                * (arc
                    + shrink
                        * arc_sin
                        * (midpoint_cos
                            + shrink * arc_cos * (2. * midpoint_cos * midpoint_cos - 1.)));
        let lon2 = lon1 + lon_arc;

        // Forward azimuth where the geodesic arrives
        let bearing2 = eq_azimuth_sin.atan2(-across);

        (
            LatLon::from_radians(lat2, lon2).normalized(),
            bearing2.to_degrees(),
        )
    }
}

// ----- T E S T S ---------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn geodesics() -> Result<(), Error> {
        let ellps = Body::named("GRS80")?;

        // Copenhagen (Denmark)--Paris (France). Expected values from
        // Karney: https://geographiclib.sourceforge.io/cgi-bin/GeodSolve
        // Positions good to a nanodegree, azimuth to a nanodegree.
        let copenhagen = LatLon::new(55., 12.);
        let (paris, azi2) = ellps.geodesic_fwd(copenhagen, -130.15406042072, 956066.231959);
        assert!((paris.lat() - 49.).abs() < 1e-9);
        assert!((paris.lon() - 2.).abs() < 1e-9);
        assert!((azi2 - (-138.05257941874)).abs() < 1e-9);

        // Copenhagen--Rabat (Morocco)
        let (rabat, _) = ellps.geodesic_fwd(copenhagen, -168.48914418666, 2365723.367715);
        assert!((rabat.lat() - 34.).abs() < 1e-9);
        assert!((rabat.lon() - 7.).abs() < 1e-9);

        // A backwards step is a step along the reciprocal azimuth
        let (back, _) = ellps.geodesic_fwd(paris, -138.05257941874, -956066.231959);
        assert!((back.lat() - 55.).abs() < 1e-9);
        assert!((back.lon() - 12.).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn spherical_specialization() -> Result<(), Error> {
        let sphere = Body::named("Mars-sphere")?;
        let r = sphere.semimajor_axis();
        let quarter = std::f64::consts::FRAC_PI_2 * r;

        // Due east along the equator
        let (p, azi2) = sphere.geodesic_fwd(LatLon::new(0., 0.), 90., quarter);
        assert!((p.lat() - 0.).abs() < 1e-9);
        assert!((p.lon() - 90.).abs() < 1e-9);
        assert!((azi2 - 90.).abs() < 1e-9);

        // Due north from the equator to the pole
        let (p, _) = sphere.geodesic_fwd(LatLon::new(0., 45.), 0., quarter);
        assert!((p.lat() - 90.).abs() < 1e-9);

        // From a great-circle vertex at 45 N, a quarter arc heading east
        // descends to the equatorial node 90 degrees further along
        let (p, _) = sphere.geodesic_fwd(LatLon::new(45., 0.), 90., quarter);
        assert!((p.lat() - 0.).abs() < 1e-9);
        assert!((p.lon() - 90.).abs() < 1e-9);
        Ok(())
    }
}
