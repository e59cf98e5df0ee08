//! Snapshot → vector tile.
//!
//! Selects cached match states intersecting the tile's buffered bbox,
//! reprojects storage-CRS meters to tile-local integer coordinates, clips,
//! and encodes. One feature per match state:
//! - both geometries: a line between centroids (the positional offset),
//!   tagged `deviation=in-both`
//! - upstream only: a centroid point tagged `deviation=not-in-live`
//! - live only: a centroid point tagged `deviation=not-in-upstream`
//!
//! Every feature carries the upstream tag mapping serialized as the
//! `upstream_tags` attribute for client-side display.

use prost::Message;

use mapdrift_common::{BBox, Point};
use mapdrift_engine::{MatchKind, MatchState, Snapshot};

use crate::clip::clip_segment;
use crate::encode::{LayerBuilder, TILE_EXTENT};
use crate::grid::TileGrid;
use crate::vector_tile as vt;

/// Clip buffer around the tile, in tile-local units.
const TILE_BUFFER: u32 = 64;

pub const LAYER_NAME: &str = "deviations";

fn to_local(p: &Point, bbox: &BBox) -> (i32, i32) {
    let span = bbox.max_x - bbox.min_x;
    let x = ((p.x - bbox.min_x) / span * TILE_EXTENT as f64).round() as i32;
    // Tile-local y grows downward.
    let y = ((bbox.max_y - p.y) / span * TILE_EXTENT as f64).round() as i32;
    (x, y)
}

/// Render one tile from a published snapshot. An empty selection encodes
/// to a valid empty tile, never an error.
pub fn render_tile(snapshot: &Snapshot, grid: &TileGrid, z: u32, x: u32, y: u32) -> Vec<u8> {
    if z > crate::grid::MAX_ZOOM {
        return vt::Tile::default().encode_to_vec();
    }
    let bbox = grid.tile_bbox(z, x, y);
    let buffer_m = grid.tile_span(z) * TILE_BUFFER as f64 / TILE_EXTENT as f64;
    let clip_box = bbox.expanded(buffer_m);

    let mut layer = LayerBuilder::new(LAYER_NAME);

    for state in &snapshot.states {
        let intersects = state
            .upstream_geom
            .iter()
            .chain(state.live_geom.iter())
            .any(|g| g.intersects_bbox(&clip_box));
        if !intersects {
            continue;
        }
        render_state(state, &mut layer, &clip_box, &bbox);
    }

    if layer.is_empty() {
        return vt::Tile::default().encode_to_vec();
    }
    vt::Tile {
        layers: vec![layer.build()],
    }
    .encode_to_vec()
}

fn render_state(state: &MatchState, layer: &mut LayerBuilder, clip_box: &BBox, bbox: &BBox) {
    let serialized_tags = serde_json::to_string(&state.tags).unwrap_or_default();
    let kind = state.kind.to_string();
    let attrs = [
        ("deviation", kind.as_str()),
        ("upstream_tags", serialized_tags.as_str()),
    ];

    let upstream_centroid = state.upstream_geom.as_ref().and_then(|g| g.centroid());
    let live_centroid = state.live_geom.as_ref().and_then(|g| g.centroid());

    match state.kind {
        MatchKind::InBoth => {
            let (Some(a), Some(b)) = (upstream_centroid, live_centroid) else {
                return;
            };
            let Some((a, b)) = clip_segment(&a, &b, clip_box) else {
                return;
            };
            let (la, lb) = (to_local(&a, bbox), to_local(&b, bbox));
            if la == lb {
                // Offset below one tile pixel: a zero-length line is not
                // valid MVT geometry, draw the point instead.
                layer.add_point(la, attrs);
            } else {
                layer.add_line(&[la, lb], attrs);
            }
        }
        MatchKind::NotInLive => {
            let Some(p) = upstream_centroid else { return };
            if clip_box.contains(&p) {
                layer.add_point(to_local(&p, bbox), attrs);
            }
        }
        MatchKind::NotInUpstream => {
            let Some(p) = live_centroid else { return };
            if clip_box.contains(&p) {
                layer.add_point(to_local(&p, bbox), attrs);
            }
        }
    }
}
