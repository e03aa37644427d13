//! Spherical triangular segments and the point probes tested against
//! them.

mod overlap;

use crate::Error;
use crate::body::MARS_RADIUS_M;
use crate::coordinate::{LatLon, Vec3};
use crate::math::sphere::{NORM_EPSILON, geodesic_distance, latlon_to_unit, unit_to_latlon};

/// Tolerance of the half-space inside-test; corresponds to well under a
/// millimeter of position error at planetary radii
pub const INCLUSION_EPSILON: f64 = 1e-10;

// ----- P O I N T   Q U E R Y ---------------------------------------------------------

/// A surface probe: a position and a tolerance radius in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointQuery {
    latlon: LatLon,
    radius_m: f64,
    xyz: Vec3,
}

impl PointQuery {
    pub fn new(lat: f64, lon: f64, radius_m: f64) -> Result<PointQuery, Error> {
        if !(-90. ..=90.).contains(&lat) {
            return Err(Error::BadParam("latitude".to_string(), lat.to_string()));
        }
        if radius_m < 0. || !radius_m.is_finite() {
            return Err(Error::BadParam("radius".to_string(), radius_m.to_string()));
        }
        let latlon = LatLon::new(lat, lon);
        Ok(PointQuery {
            latlon,
            radius_m,
            xyz: latlon_to_unit(latlon),
        })
    }

    #[must_use]
    pub fn latlon(&self) -> LatLon {
        self.latlon
    }

    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// The probe position as a unit vector
    #[must_use]
    pub fn xyz(&self) -> Vec3 {
        self.xyz
    }
}

// ----- T R I S E G M E N T -----------------------------------------------------------

/// A spherical triangle approximating part of a footprint.
///
/// Vertices are ordered counter-clockwise viewed from outside the body;
/// that ordering is what makes the inside-test a conjunction of
/// half-space tests, so constructors preserving it are the only way to
/// obtain a `TriSegment`. All derived quantities are computed up front:
/// eight doubles of input become a handful of cached vectors, and
/// segments stay plain shareable values.
#[derive(Debug, Clone, PartialEq)]
pub struct TriSegment {
    vertices: [LatLon; 3],
    xyz: [Vec3; 3],
    center: LatLon,
    radius_m: f64,
    normals: [Vec3; 3],
    tangent_plane: [Vec3; 2],
    body_radius_m: f64,
}

impl TriSegment {
    /// A segment on the Mars reference sphere
    pub fn new(v0: LatLon, v1: LatLon, v2: LatLon) -> Result<TriSegment, Error> {
        TriSegment::new_on_radius(v0, v1, v2, MARS_RADIUS_M)
    }

    /// A segment on a sphere of the given radius. The radius scales
    /// reported distances; predicates on unit vectors are unaffected.
    pub fn new_on_radius(
        v0: LatLon,
        v1: LatLon,
        v2: LatLon,
        body_radius_m: f64,
    ) -> Result<TriSegment, Error> {
        let vertices = [v0, v1, v2];
        let xyz = [
            latlon_to_unit(v0),
            latlon_to_unit(v1),
            latlon_to_unit(v2),
        ];

        let mut normals = [Vec3::default(); 3];
        for i in 0..3 {
            let cross = xyz[i].cross(xyz[(i + 1) % 3]);
            let norm = cross.norm();
            if norm < NORM_EPSILON {
                return Err(Error::Degenerate("triangle with coincident vertices"));
            }
            normals[i] = cross.scale(1. / norm);
        }

        let mean = xyz[0].add(xyz[1]).add(xyz[2]).scale(1. / 3.);
        let center = unit_to_latlon(mean)?;

        // Maximal vertex distance: the bounding cap radius the tree
        // relies on for pruning
        let mut radius_m = 0f64;
        for v in vertices {
            radius_m = radius_m.max(geodesic_distance(center, v, body_radius_m));
        }

        let tangent_plane = tangent_basis(latlon_to_unit(center));

        Ok(TriSegment {
            vertices,
            xyz,
            center,
            radius_m,
            normals,
            tangent_plane,
            body_radius_m,
        })
    }

    #[must_use]
    pub fn vertices(&self) -> [LatLon; 3] {
        self.vertices
    }

    /// Unit vectors of the three vertices
    #[must_use]
    pub fn xyz(&self) -> [Vec3; 3] {
        self.xyz
    }

    /// Center of the bounding cap
    #[must_use]
    pub fn center(&self) -> LatLon {
        self.center
    }

    /// Radius of the bounding cap, in meters
    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Radius of the reference sphere this segment measures distances on
    #[must_use]
    pub fn body_radius_m(&self) -> f64 {
        self.body_radius_m
    }

    /// True when the unit vector `p` lies in the triangle. Exact for
    /// points on the sphere and monotone in the inclusion tolerance.
    #[must_use]
    pub fn is_inside(&self, p: Vec3) -> bool {
        self.normals
            .iter()
            .all(|n| n.dot(p) >= -INCLUSION_EPSILON)
    }

    /// Geodesic distance in meters from the unit vector `p` to the
    /// nearest point of the triangle; zero when inside.
    ///
    /// Outside, the nearest point is either a vertex or the foot of the
    /// perpendicular on one of the edge great circles, the latter
    /// retained only when it falls on the triangle's own arc of that
    /// circle. A probe antipodal to an edge plane has no defined foot
    /// and contributes nothing.
    pub fn distance_to_point(&self, p: Vec3) -> Result<f64, Error> {
        if self.is_inside(p) {
            return Ok(0.);
        }

        let probe = unit_to_latlon(p)?;
        let mut best = f64::INFINITY;
        for v in self.vertices {
            best = best.min(geodesic_distance(probe, v, self.body_radius_m));
        }

        for n in self.normals {
            let foot = p.sub(n.scale(n.dot(p)));
            let norm = foot.norm();
            if norm < NORM_EPSILON {
                continue;
            }
            let foot = foot.scale(1. / norm);
            if self.is_inside(foot) {
                best = best.min(geodesic_distance(probe, unit_to_latlon(foot)?, self.body_radius_m));
            }
        }

        Ok(best)
    }

    /// True when the probe is inside the triangle (zero radius) or
    /// within its tolerance radius of it
    #[must_use]
    pub fn includes_point(&self, query: &PointQuery) -> bool {
        if query.radius_m() == 0. {
            return self.is_inside(query.xyz());
        }
        // The probe vector is unit by construction, so the distance
        // computation cannot fail
        self.distance_to_point(query.xyz())
            .map_or(false, |d| d <= query.radius_m())
    }

    /// True when the two triangles overlap with positive area.
    ///
    /// Both triangles are projected onto this segment's tangent plane (a
    /// shared local chart) and clipped as planar convex polygons. For
    /// candidates that already passed the tree's cap filter the chart
    /// distortion is second order in the cap radius; the failure mode is
    /// limited to near-antipodal pairs, which that filter rejects.
    #[must_use]
    pub fn overlaps_segment(&self, other: &TriSegment) -> bool {
        let ours = self.xyz.map(|p| self.project(p));
        let theirs = other.xyz.map(|p| self.project(p));
        overlap::convex_overlap_area(&ours, &theirs) > 0.
    }

    // 2-D coordinates of `p` in the tangent-plane chart
    fn project(&self, p: Vec3) -> [f64; 2] {
        [self.tangent_plane[0].dot(p), self.tangent_plane[1].dot(p)]
    }
}

// Orthonormal basis (u, v) of the plane tangent at the unit vector `n`,
// right-handed with the outward normal: u x v = n, so counter-clockwise
// winding on the sphere stays counter-clockwise in the chart
fn tangent_basis(n: Vec3) -> [Vec3; 2] {
    let reference = if n[0].abs() <= n[1].abs() && n[0].abs() <= n[2].abs() {
        Vec3::new(1., 0., 0.)
    } else if n[1].abs() <= n[2].abs() {
        Vec3::new(0., 1., 0.)
    } else {
        Vec3::new(0., 0., 1.)
    };

    let u = reference.sub(n.scale(reference.dot(n)));
    let u = u.scale(1. / u.norm());
    let v = n.cross(u);
    [u, v]
}

// ----- T E S T S ---------------------------------------------------------------------
