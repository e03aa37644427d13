//! The on-disk form of a segment tree: a versioned, explicit
//! little-endian layout, so readers in other languages can map the file
//! without replaying construction.
//!
//! ```text
//! magic           4 bytes  "TDXT"
//! version         u32
//! body_radius_m   f64
//! max_radius_m    f64
//! n_points        u64
//! points          n_points x (lat f64, lon f64)   radians
//! indices         n_points x u64                  tree permutation
//! n_nodes         u64
//! nodes           n_nodes x (lat f64, lon f64, radius f64,
//!                            start u64, end u64, kind u64,
//!                            left u64, right u64)
//! ```
//!
//! `kind` is 0 for a leaf (left/right are zero and ignored) and 1 for a
//! branch.

use std::path::Path;

use super::{BallTree, Node, NodeKind, SegmentTree};
use crate::Error;

const MAGIC: &[u8; 4] = b"TDXT";
const VERSION: u32 = 1;

const KIND_LEAF: u64 = 0;
const KIND_BRANCH: u64 = 1;

// ----- W R I T I N G -----------------------------------------------------------------

pub(super) fn write(tree: &SegmentTree, path: &Path) -> Result<(), Error> {
    let mut buf = Vec::with_capacity(64 + 80 * tree.tree.points.len());

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&tree.body_radius_m.to_le_bytes());
    buf.extend_from_slice(&tree.max_radius_m.to_le_bytes());

    buf.extend_from_slice(&(tree.tree.points.len() as u64).to_le_bytes());
    for point in &tree.tree.points {
        buf.extend_from_slice(&point[0].to_le_bytes());
        buf.extend_from_slice(&point[1].to_le_bytes());
    }
    for &index in &tree.tree.indices {
        buf.extend_from_slice(&(index as u64).to_le_bytes());
    }

    buf.extend_from_slice(&(tree.tree.nodes.len() as u64).to_le_bytes());
    for node in &tree.tree.nodes {
        buf.extend_from_slice(&node.center[0].to_le_bytes());
        buf.extend_from_slice(&node.center[1].to_le_bytes());
        buf.extend_from_slice(&node.radius.to_le_bytes());
        buf.extend_from_slice(&(node.start as u64).to_le_bytes());
        buf.extend_from_slice(&(node.end as u64).to_le_bytes());
        let (kind, left, right) = match node.kind {
            NodeKind::Leaf => (KIND_LEAF, 0, 0),
            NodeKind::Branch { left, right } => (KIND_BRANCH, left as u64, right as u64),
        };
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(&left.to_le_bytes());
        buf.extend_from_slice(&right.to_le_bytes());
    }

    // Readers may hold the previous artifact open; expose the new one
    // in a single rename
    let temporary = temp_sibling(path);
    std::fs::write(&temporary, &buf)?;
    std::fs::rename(&temporary, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ----- R E A D I N G -----------------------------------------------------------------

// Cursor over the artifact buffer; every read is bounds checked so a
// truncated file surfaces as CorruptArtifact rather than a panic
struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
    name: &'a str,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let Some(bytes) = self.buf.get(self.offset..self.offset + len) else {
            return Err(Error::CorruptArtifact(
                self.name.to_string(),
                format!("truncated at byte {}", self.offset),
            ));
        };
        self.offset += len;
        Ok(bytes)
    }

    fn get_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn get_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn get_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn corrupt(&self, what: &str) -> Error {
        Error::CorruptArtifact(self.name.to_string(), what.to_string())
    }
}

pub(super) fn read(path: &Path) -> Result<SegmentTree, Error> {
    let buf = std::fs::read(path)?;
    let name = path.display().to_string();
    let mut reader = Reader {
        buf: &buf,
        offset: 0,
        name: &name,
    };

    if reader.take(4)? != MAGIC {
        return Err(reader.corrupt("bad magic"));
    }
    let version = reader.get_u32()?;
    if version != VERSION {
        return Err(reader.corrupt(&format!("unsupported version {version}")));
    }

    let body_radius_m = reader.get_f64()?;
    let max_radius_m = reader.get_f64()?;

    let n_points = reader.get_u64()? as usize;
    let mut points = Vec::with_capacity(n_points.min(1 << 20));
    for _ in 0..n_points {
        points.push([reader.get_f64()?, reader.get_f64()?]);
    }

    let mut indices = Vec::with_capacity(n_points.min(1 << 20));
    for _ in 0..n_points {
        let index = reader.get_u64()? as usize;
        if index >= n_points {
            return Err(reader.corrupt("point index out of range"));
        }
        indices.push(index);
    }

    let n_nodes = reader.get_u64()? as usize;
    let mut nodes = Vec::with_capacity(n_nodes.min(1 << 20));
    for _ in 0..n_nodes {
        let center = [reader.get_f64()?, reader.get_f64()?];
        let radius = reader.get_f64()?;
        let start = reader.get_u64()? as usize;
        let end = reader.get_u64()? as usize;
        let kind = reader.get_u64()?;
        let left = reader.get_u64()? as usize;
        let right = reader.get_u64()? as usize;

        if start > end || end > n_points {
            return Err(reader.corrupt("node range out of bounds"));
        }
        let kind = match kind {
            KIND_LEAF => NodeKind::Leaf,
            KIND_BRANCH => {
                if left >= n_nodes || right >= n_nodes {
                    return Err(reader.corrupt("child node out of range"));
                }
                NodeKind::Branch { left, right }
            }
            other => return Err(reader.corrupt(&format!("unknown node kind {other}"))),
        };

        nodes.push(Node {
            center,
            radius,
            start,
            end,
            kind,
        });
    }

    if reader.offset != buf.len() {
        return Err(reader.corrupt("trailing bytes"));
    }

    Ok(SegmentTree {
        max_radius_m,
        body_radius_m,
        tree: BallTree {
            nodes,
            points,
            indices,
        },
    })
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::LatLon;
    use crate::segment::{PointQuery, TriSegment};

    fn sample_tree() -> SegmentTree {
        let mut segments = Vec::new();
        for i in 0..40 {
            let lat = -60. + 3. * i as f64;
            segments.push(
                TriSegment::new(
                    LatLon::new(lat + 1., 10.),
                    LatLon::new(lat, 9.),
                    LatLon::new(lat, 11.),
                )
                .unwrap(),
            );
        }
        SegmentTree::build(&segments)
    }

    #[test]
    fn roundtrip_preserves_queries() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test_segment_tree.bin");

        let tree = sample_tree();
        tree.save(&path)?;
        let loaded = SegmentTree::load(&path)?;

        assert_eq!(loaded.len(), tree.len());
        assert_eq!(loaded.max_radius_m(), tree.max_radius_m());

        for (lat, lon) in [(0., 10.), (-59.5, 9.8), (33.2, 10.5), (80., 10.)] {
            let query = PointQuery::new(lat, lon, 5_000.)?;
            let mut a = tree.query_point(&query);
            let mut b = loaded.query_point(&query);
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b, "probe ({lat}, {lon})");
        }
        Ok(())
    }

    #[test]
    fn repeated_queries_are_identical() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test_segment_tree.bin");
        sample_tree().save(&path)?;

        let tree = SegmentTree::load(&path)?;
        let query = PointQuery::new(0., 10., 100_000.)?;
        let first = tree.query_point(&query);
        for _ in 0..3 {
            assert_eq!(tree.query_point(&query), first);
        }
        Ok(())
    }

    #[test]
    fn save_replaces_atomically() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test_segment_tree.bin");

        sample_tree().save(&path)?;
        let empty = SegmentTree::build(&[]);
        empty.save(&path)?;

        // The replacement is complete (no leftover temp file, new content)
        assert!(SegmentTree::load(&path)?.is_empty());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn rejects_foreign_files() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("not_a_tree.bin");
        std::fs::write(&path, b"PK\x03\x04 definitely a zip")?;
        assert!(matches!(
            SegmentTree::load(&path),
            Err(Error::CorruptArtifact(_, _))
        ));
        Ok(())
    }

    #[test]
    fn rejects_truncation() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test_segment_tree.bin");
        sample_tree().save(&path)?;

        let full = std::fs::read(&path)?;
        for cut in [3, 7, 40, full.len() / 2, full.len() - 1] {
            std::fs::write(&path, &full[..cut])?;
            assert!(
                matches!(SegmentTree::load(&path), Err(Error::CorruptArtifact(_, _))),
                "cut at {cut} not detected"
            );
        }
        Ok(())
    }

    #[test]
    fn rejects_version_drift() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test_segment_tree.bin");
        sample_tree().save(&path)?;

        let mut bytes = std::fs::read(&path)?;
        bytes[4] = 99;
        std::fs::write(&path, &bytes)?;
        assert!(matches!(
            SegmentTree::load(&path),
            Err(Error::CorruptArtifact(_, _))
        ));
        Ok(())
    }
}
