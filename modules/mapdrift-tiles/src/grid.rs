//! Square tile pyramid over the storage CRS.
//!
//! Zoom `z` splits the world extent into `2^z` by `2^z` tiles; columns run
//! west to east, rows top to bottom (XYZ convention). All bboxes come back
//! in storage CRS meters, so selection and clipping never leave the
//! coordinate system the matcher works in.

use mapdrift_common::BBox;

/// Half-width of the default world extent, meters.
pub const DEFAULT_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Deepest zoom the grid serves. Requests beyond this are rejected at the
/// tile endpoint; the clamp below keeps the shift defined for any `z`.
pub const MAX_ZOOM: u32 = 30;

#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    /// West edge of the world extent.
    pub origin_x: f64,
    /// North edge of the world extent. Rows count downward from here.
    pub origin_y: f64,
    /// Width (and height) of the square world extent.
    pub world_size: f64,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            origin_x: -DEFAULT_HALF_EXTENT,
            origin_y: DEFAULT_HALF_EXTENT,
            world_size: 2.0 * DEFAULT_HALF_EXTENT,
        }
    }
}

impl TileGrid {
    /// Grid over a custom square extent, for deployments whose storage CRS
    /// is a national projected grid rather than the default extent.
    pub fn new(origin_x: f64, origin_y: f64, world_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            world_size,
        }
    }

    /// Number of tiles along one axis at zoom `z`. Zooms past [`MAX_ZOOM`]
    /// clamp to it.
    pub fn tiles_at(z: u32) -> u64 {
        1u64 << z.min(MAX_ZOOM)
    }

    /// Side length of one tile at zoom `z`, meters.
    pub fn tile_span(&self, z: u32) -> f64 {
        self.world_size / Self::tiles_at(z) as f64
    }

    /// Bounding box of tile (z, x, y) in storage CRS meters.
    pub fn tile_bbox(&self, z: u32, x: u32, y: u32) -> BBox {
        let span = self.tile_span(z);
        let min_x = self.origin_x + x as f64 * span;
        let max_y = self.origin_y - y as f64 * span;
        BBox::new(min_x, max_y - span, min_x + span, max_y)
    }
}
