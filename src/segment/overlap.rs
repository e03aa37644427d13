//! Planar convex polygon intersection, used for the tangent-plane
//! overlap test.

// z-component of the cross product (b - a) x (p - a): positive when `p`
// is left of the directed edge a -> b
fn edge_side(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

// Twice the signed area; positive for counter-clockwise winding
fn double_signed_area(polygon: &[[f64; 2]]) -> f64 {
    let n = polygon.len();
    let mut sum = 0.;
    for i in 0..n {
        let p = polygon[i];
        let q = polygon[(i + 1) % n];
        sum += p[0] * q[1] - q[0] * p[1];
    }
    sum
}

fn oriented_ccw(polygon: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut vertices = polygon.to_vec();
    if double_signed_area(&vertices) < 0. {
        vertices.reverse();
    }
    vertices
}

// One Sutherland-Hodgman pass: keep the part of `polygon` on the left of
// the directed clip edge a -> b
fn clip_by_edge(polygon: &[[f64; 2]], a: [f64; 2], b: [f64; 2]) -> Vec<[f64; 2]> {
    let mut clipped = Vec::with_capacity(polygon.len() + 1);
    let n = polygon.len();
    for i in 0..n {
        let current = polygon[i];
        let next = polygon[(i + 1) % n];
        let side_current = edge_side(a, b, current);
        let side_next = edge_side(a, b, next);

        if side_current >= 0. {
            clipped.push(current);
        }
        if (side_current > 0. && side_next < 0.) || (side_current < 0. && side_next > 0.) {
            // The edge crosses the clip line; sides differ, so the
            // denominator cannot vanish
            let t = side_current / (side_current - side_next);
            clipped.push([
                current[0] + t * (next[0] - current[0]),
                current[1] + t * (next[1] - current[1]),
            ]);
        }
    }
    clipped
}

/// Area of the intersection of two convex polygons, in the coordinates
/// of the shared chart. Input winding may be either orientation.
pub(crate) fn convex_overlap_area(a: &[[f64; 2]], b: &[[f64; 2]]) -> f64 {
    let mut polygon = oriented_ccw(a);
    let clip = oriented_ccw(b);

    let n = clip.len();
    for i in 0..n {
        if polygon.is_empty() {
            return 0.;
        }
        polygon = clip_by_edge(&polygon, clip[i], clip[(i + 1) % n]);
    }

    double_signed_area(&polygon).abs() / 2.
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    const UNIT_SQUARE: [[f64; 2]; 4] = [[0., 0.], [1., 0.], [1., 1.], [0., 1.]];

    #[test]
    fn identical_polygons() {
        assert_float_eq!(
            convex_overlap_area(&UNIT_SQUARE, &UNIT_SQUARE),
            1.,
            abs <= 1e-12
        );
    }

    #[test]
    fn partial_overlap() {
        let shifted = [[0.5, 0.5], [1.5, 0.5], [1.5, 1.5], [0.5, 1.5]];
        assert_float_eq!(
            convex_overlap_area(&UNIT_SQUARE, &shifted),
            0.25,
            abs <= 1e-12
        );
    }

    #[test]
    fn disjoint_polygons() {
        let far = [[5., 5.], [6., 5.], [6., 6.], [5., 6.]];
        assert_eq!(convex_overlap_area(&UNIT_SQUARE, &far), 0.);
    }

    #[test]
    fn shared_edge_has_zero_area() {
        let neighbor = [[1., 0.], [2., 0.], [2., 1.], [1., 1.]];
        assert_float_eq!(
            convex_overlap_area(&UNIT_SQUARE, &neighbor),
            0.,
            abs <= 1e-12
        );
    }

    #[test]
    fn winding_insensitive() {
        let cw: Vec<[f64; 2]> = UNIT_SQUARE.iter().rev().copied().collect();
        let triangle = [[0., 0.], [2., 0.], [0., 2.]];
        let expected = convex_overlap_area(&UNIT_SQUARE, &triangle);
        assert_float_eq!(convex_overlap_area(&cw, &triangle), expected, abs <= 1e-12);
        assert_float_eq!(
            convex_overlap_area(&triangle, &UNIT_SQUARE),
            expected,
            abs <= 1e-12
        );
    }

    #[test]
    fn triangle_in_square() {
        let triangle = [[0.25, 0.25], [0.75, 0.25], [0.5, 0.75]];
        assert_float_eq!(
            convex_overlap_area(&UNIT_SQUARE, &triangle),
            0.125,
            abs <= 1e-12
        );
    }
}
