//! The coarse spatial filter: a haversine ball tree over segment
//! centers, plus the artifact that persists it.

mod artifact;

use std::path::Path;

use crate::Error;
use crate::body::MARS_RADIUS_M;
use crate::math::sphere::haversine;
use crate::segment::{PointQuery, TriSegment};

// Maximum number of points in a leaf node before we stop splitting
const LEAF_SIZE: usize = 4;

// ----- B A L L   T R E E -------------------------------------------------------------

// A balanced binary tree of bounding caps over positions on the sphere,
// given as [latitude, longitude] in radians. Construction recursively
// splits at the median along the axis of maximum dispersion; the split
// axis only shapes the tree, correctness rests on each node's cap
// covering its members under the haversine metric.
#[derive(Debug, Clone)]
struct Node {
    center: [f64; 2],
    radius: f64, // central angle, radians
    start: usize,
    end: usize,
    kind: NodeKind,
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf,
    Branch { left: usize, right: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct BallTree {
    nodes: Vec<Node>,
    points: Vec<[f64; 2]>,
    indices: Vec<usize>,
}

impl BallTree {
    fn new(points: Vec<[f64; 2]>) -> BallTree {
        let n = points.len();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut nodes = Vec::new();

        if n > 0 {
            build_recursive(&points, &mut indices, 0, n, &mut nodes);
        }

        BallTree {
            nodes,
            points,
            indices,
        }
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    /// Original indices of all points within haversine `radius` (a
    /// central angle in radians) of `query`. No particular order.
    fn within_radius(&self, query: [f64; 2], radius: f64) -> Vec<usize> {
        let mut results = Vec::new();
        if !self.nodes.is_empty() {
            self.radius_search(0, query, radius, &mut results);
        }
        results
    }

    fn radius_search(
        &self,
        node_idx: usize,
        query: [f64; 2],
        search_radius: f64,
        results: &mut Vec<usize>,
    ) {
        let node = &self.nodes[node_idx];
        let dist_to_center = haversine(query, node.center);

        // Prune: the cap is entirely outside the search radius
        if dist_to_center - node.radius > search_radius {
            return;
        }

        // Bulk include: the cap is entirely within the search radius
        if dist_to_center + node.radius <= search_radius {
            results.extend_from_slice(&self.indices[node.start..node.end]);
            return;
        }

        match node.kind {
            NodeKind::Leaf => {
                results.extend(
                    self.indices[node.start..node.end]
                        .iter()
                        .filter(|&&idx| haversine(query, self.points[idx]) <= search_radius),
                );
            }
            NodeKind::Branch { left, right } => {
                self.radius_search(left, query, search_radius, results);
                self.radius_search(right, query, search_radius, results);
            }
        }
    }
}

// The unit vector under a [lat, lon] position in radians
fn unit(p: [f64; 2]) -> [f64; 3] {
    let (latsin, latcos) = p[0].sin_cos();
    let (lonsin, loncos) = p[1].sin_cos();
    [latcos * loncos, latcos * lonsin, latsin]
}

// Spherical mean of a set of positions: the normalized vector sum. For
// a degenerate sum (points spread over the whole sphere) any member
// serves; the cap radius still covers them all.
fn spherical_mean(points: &[[f64; 2]], indices: &[usize]) -> [f64; 2] {
    let mut sum = [0f64; 3];
    for &idx in indices {
        let v = unit(points[idx]);
        sum[0] += v[0];
        sum[1] += v[1];
        sum[2] += v[2];
    }
    let norm = (sum[0] * sum[0] + sum[1] * sum[1] + sum[2] * sum[2]).sqrt();
    if norm < 1e-9 {
        return points[indices[0]];
    }
    [(sum[2] / norm).asin(), sum[1].atan2(sum[0])]
}

fn build_recursive(
    points: &[[f64; 2]],
    indices: &mut [usize],
    start: usize,
    end: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let count = end - start;
    debug_assert!(count > 0);

    let center = spherical_mean(points, &indices[start..end]);
    let radius = indices[start..end]
        .iter()
        .map(|&idx| haversine(center, points[idx]))
        .fold(0f64, f64::max);

    let node_idx = nodes.len();

    if count <= LEAF_SIZE {
        nodes.push(Node {
            center,
            radius,
            start,
            end,
            kind: NodeKind::Leaf,
        });
        return node_idx;
    }

    // Reserve our slot; children are appended after this
    nodes.push(Node {
        center,
        radius,
        start,
        end,
        kind: NodeKind::Leaf, // placeholder, overwritten below
    });

    // Partition at the median along the axis of maximum dispersion
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    for &idx in &indices[start..end] {
        min_lat = min_lat.min(points[idx][0]);
        max_lat = max_lat.max(points[idx][0]);
        min_lon = min_lon.min(points[idx][1]);
        max_lon = max_lon.max(points[idx][1]);
    }
    let axis = usize::from(max_lon - min_lon > max_lat - min_lat);

    let mid = start + count / 2;
    indices[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
        points[a][axis]
            .partial_cmp(&points[b][axis])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let left = build_recursive(points, indices, start, mid, nodes);
    let right = build_recursive(points, indices, mid, end, nodes);

    nodes[node_idx].kind = NodeKind::Branch { left, right };
    node_idx
}

// ----- S E G M E N T   T R E E -------------------------------------------------------

/// The per-instrument spatial index: segment centers in radians keyed by
/// segment id, the maximal segment cap radius, and a haversine ball tree
/// over the centers. Immutable after construction; concurrent readers
/// need no locking.
///
/// Queries enlarge the probe radius by the global maximum segment
/// radius, so every segment that could contain the probe is returned.
/// The per-tree (rather than per-node) maximum over-returns when segment
/// sizes vary wildly, in exchange for a simple artifact; callers apply
/// the exact predicates to the candidates regardless.
#[derive(Debug, Clone)]
pub struct SegmentTree {
    max_radius_m: f64,
    body_radius_m: f64,
    tree: BallTree,
}

impl SegmentTree {
    /// Index a collection of segments; the segment id is the position in
    /// the slice
    #[must_use]
    pub fn build(segments: &[TriSegment]) -> SegmentTree {
        let centers: Vec<[f64; 2]> = segments.iter().map(|s| s.center().to_radians()).collect();
        let max_radius_m = segments.iter().map(TriSegment::radius_m).fold(0f64, f64::max);
        let body_radius_m = segments
            .first()
            .map_or(MARS_RADIUS_M, TriSegment::body_radius_m);

        SegmentTree {
            max_radius_m,
            body_radius_m,
            tree: BallTree::new(centers),
        }
    }

    /// Number of indexed segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// The maximal segment cap radius, in meters
    #[must_use]
    pub fn max_radius_m(&self) -> f64 {
        self.max_radius_m
    }

    /// Ids of segments whose center lies within the probe radius plus
    /// the maximal segment radius: a superset of all segments containing
    /// the probe
    #[must_use]
    pub fn query_point(&self, query: &PointQuery) -> Vec<usize> {
        let total_radius = query.radius_m() + self.max_radius_m;
        self.tree
            .within_radius(query.latlon().to_radians(), total_radius / self.body_radius_m)
    }

    /// Ids of segments whose center lies within the segment's cap radius
    /// plus the maximal segment radius of this tree
    #[must_use]
    pub fn query_segment(&self, segment: &TriSegment) -> Vec<usize> {
        let total_radius = segment.radius_m() + self.max_radius_m;
        self.tree
            .within_radius(segment.center().to_radians(), total_radius / self.body_radius_m)
    }

    /// Persist to the versioned binary artifact layout, via a temporary
    /// file and an atomic rename
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        artifact::write(self, path)
    }

    /// Load a persisted tree
    pub fn load(path: &Path) -> Result<SegmentTree, Error> {
        artifact::read(path)
    }
}

// ----- T E S T S ---------------------------------------------------------------------
