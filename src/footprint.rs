//! Decomposition of an observation footprint into spherical triangular
//! segments.

use crate::Error;
use crate::localizer::Localizer;
use crate::segment::TriSegment;

/// Segment the footprint of one observation at the given target
/// resolution in meters.
///
/// The pixel domain is divided into `⌈extent / resolution⌉` cells per
/// axis, every grid node is localized, and each grid cell contributes two
/// triangles. Cells are split (rather than kept as quadrilaterals)
/// because the inside-test treats a segment as an intersection of
/// half-spaces, which demands convexity on the sphere. The winding that
/// keeps vertices counter-clockwise seen from outside the body depends
/// on the flight direction.
///
/// Any localizer failure aborts the whole observation: a partially
/// segmented footprint is worse than a missing one, because it would
/// satisfy point queries while silently missing coverage.
pub fn segment_footprint(
    localizer: &dyn Localizer,
    resolution_m: f64,
) -> Result<Vec<TriSegment>, Error> {
    if resolution_m <= 0. {
        return Err(Error::Invalid("non-positive resolution".to_string()));
    }

    let n_col_cells = (localizer.observation_width_m() / resolution_m).ceil() as usize;
    let n_row_cells = (localizer.observation_length_m() / resolution_m).ceil() as usize;
    if n_col_cells == 0 || n_row_cells == 0 {
        // A zero-extent footprint has nothing to cover
        return Ok(Vec::new());
    }

    let rows = localizer.rows();
    let cols = localizer.cols();

    // Localize every node of the (n_row_cells + 1) x (n_col_cells + 1) grid
    let mut grid = Vec::with_capacity((n_row_cells + 1) * (n_col_cells + 1));
    for i in 0..=n_row_cells {
        let row = rows * i as f64 / n_row_cells as f64;
        for j in 0..=n_col_cells {
            let col = cols * j as f64 / n_col_cells as f64;
            grid.push(localizer.pixel_to_latlon(row, col)?);
        }
    }
    let at = |r: usize, c: usize| grid[r * (n_col_cells + 1) + c];

    let mut segments = Vec::with_capacity(2 * n_row_cells * n_col_cells);
    for r in 0..n_row_cells {
        for c in 0..n_col_cells {
            let tl = at(r, c);
            let tr = at(r, c + 1);
            let bl = at(r + 1, c);
            let br = at(r + 1, c + 1);

            if localizer.flight_direction() > 0 {
                segments.push(TriSegment::new(tl, tr, bl)?);
                segments.push(TriSegment::new(br, bl, tr)?);
            } else {
                segments.push(TriSegment::new(tl, bl, tr)?);
                segments.push(TriSegment::new(br, tr, bl)?);
            }
        }
    }

    Ok(segments)
}

// ----- T E S T S ---------------------------------------------------------------------
