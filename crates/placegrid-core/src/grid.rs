//! Regular lat/lng mesh over a bounding box.
//!
//! The grid is a pure function of its inputs. Checkpoints store a position in
//! the flattened, row-major cell sequence, so regenerating the grid after a
//! crash must reproduce exactly the same order.

use crate::models::{BoundingBox, GridCell};

/// Approximate metres per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Split `bbox` into `rows × cols` cells, ordered row-major from the
/// south-west corner. Zero rows or columns yield an empty grid.
pub fn generate_grid(bbox: &BoundingBox, rows: u32, cols: u32) -> Vec<GridCell> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let lat_step = (bbox.north - bbox.south) / f64::from(rows);
    let lng_step = (bbox.east - bbox.west) / f64::from(cols);

    let mut cells = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            cells.push(GridCell {
                row,
                col,
                center_lat: bbox.south + (f64::from(row) + 0.5) * lat_step,
                center_lng: bbox.west + (f64::from(col) + 0.5) * lng_step,
            });
        }
    }
    cells
}

/// Approximate north-south and east-west distance between adjacent cell
/// centres, in metres, measured at the box's mid latitude.
pub fn cell_span_meters(bbox: &BoundingBox, rows: u32, cols: u32) -> (f64, f64) {
    if rows == 0 || cols == 0 {
        return (0.0, 0.0);
    }
    let lat_step = (bbox.north - bbox.south) / f64::from(rows);
    let lng_step = (bbox.east - bbox.west) / f64::from(cols);
    let mid_lat = bbox.center().lat.to_radians();

    (
        lat_step.abs() * METERS_PER_DEGREE,
        lng_step.abs() * METERS_PER_DEGREE * mid_lat.cos(),
    )
}
