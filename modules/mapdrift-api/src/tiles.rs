use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};

use mapdrift_tiles::{render_tile, MAX_ZOOM};

use crate::AppState;

/// Binary tile endpoint. Safe to cache aggressively: the ETag is keyed on
/// (ruleset, snapshot version) and the path carries z/x/y.
pub async fn api_tile(
    State(state): State<Arc<AppState>>,
    Path((ruleset, z, x, y)): Path<(String, u32, u32, u32)>,
) -> impl IntoResponse {
    // Unknown ruleset or out-of-range zoom fails immediately; a known
    // ruleset with no published snapshot yet serves a valid empty tile.
    if z > MAX_ZOOM || state.engine.registry().get(&ruleset).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (bytes, version) = match state.engine.snapshots().get(&ruleset) {
        Some(snapshot) => (
            render_tile(&snapshot, &state.grid, z, x, y),
            snapshot.version,
        ),
        None => (Vec::new(), 0),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{ruleset}-{version}\"")) {
        headers.insert(header::ETAG, etag);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=300"),
    );

    (headers, bytes).into_response()
}
