use std::ops::{Index, IndexMut};

/// A geographic position as `[latitude, longitude]` in degrees.
///
/// Longitudes are kept as given; predicates operating on `LatLon` convert
/// to Cartesian unit vectors and are hence wrap invariant. Use
/// [`normalized`](LatLon::normalized) when a caller needs longitudes in
/// the canonical (−180, 180] range.
#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct LatLon(pub [f64; 2]);

impl Index<usize> for LatLon {
    type Output = f64;
    fn index(&self, i: usize) -> &Self::Output {
        &self.0[i]
    }
}

impl IndexMut<usize> for LatLon {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.0[i]
    }
}

impl LatLon {
    /// A `LatLon` from latitude/longitude in degrees
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> LatLon {
        LatLon([latitude, longitude])
    }

    /// A `LatLon` from latitude/longitude in radians
    #[must_use]
    pub fn from_radians(latitude: f64, longitude: f64) -> LatLon {
        LatLon([latitude.to_degrees(), longitude.to_degrees()])
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.0[0]
    }

    #[must_use]
    pub fn lon(&self) -> f64 {
        self.0[1]
    }

    /// Both angles, converted to radians
    #[must_use]
    pub fn to_radians(&self) -> [f64; 2] {
        [self.0[0].to_radians(), self.0[1].to_radians()]
    }

    /// The same position with longitude folded into (−180, 180]
    #[must_use]
    pub fn normalized(&self) -> LatLon {
        let mut lon = self.0[1].rem_euclid(360.);
        if lon > 180. {
            lon -= 360.;
        }
        LatLon([self.0[0], lon])
    }
}

/// A Cartesian 3-vector. Mostly used for positions on the unit sphere
/// and for the plane normals derived from them.
#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct Vec3(pub [f64; 3]);

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, i: usize) -> &Self::Output {
        &self.0[i]
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.0[i]
    }
}

impl Vec3 {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3([x, y, z])
    }

    /// Scalar product
    #[must_use]
    pub fn dot(&self, other: Vec3) -> f64 {
        self.0[0] * other.0[0] + self.0[1] * other.0[1] + self.0[2] * other.0[2]
    }

    /// Vector product
    #[must_use]
    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3([
            self.0[1] * other.0[2] - self.0[2] * other.0[1],
            self.0[2] * other.0[0] - self.0[0] * other.0[2],
            self.0[0] * other.0[1] - self.0[1] * other.0[0],
        ])
    }

    /// The Euclidean norm
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    /// Multiply by a scalar
    #[must_use]
    pub fn scale(&self, factor: f64) -> Vec3 {
        Vec3([self.0[0] * factor, self.0[1] * factor, self.0[2] * factor])
    }

    #[must_use]
    pub fn add(&self, other: Vec3) -> Vec3 {
        Vec3([
            self.0[0] + other.0[0],
            self.0[1] + other.0[1],
            self.0[2] + other.0[2],
        ])
    }

    #[must_use]
    pub fn sub(&self, other: Vec3) -> Vec3 {
        Vec3([
            self.0[0] - other.0[0],
            self.0[1] - other.0[1],
            self.0[2] - other.0[2],
        ])
    }
}

// ----- T E S T S ---------------------------------------------------
