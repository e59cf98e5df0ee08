//! Vector-tile rendering of conflation match state.

pub mod clip;
pub mod encode;
pub mod grid;
pub mod render;
pub mod vector_tile;

pub use encode::{LayerBuilder, TILE_EXTENT};
pub use grid::{TileGrid, MAX_ZOOM};
pub use render::{render_tile, LAYER_NAME};
