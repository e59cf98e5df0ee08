use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use mapdrift_common::{Deviation, DeviationAction, MapdriftError};
use mapdrift_store::GeometryStore;

use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct FeedQuery {
    dataset: Option<String>,
    layer: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct ActionBody {
    action: String,
}

// --- Helpers ---

fn deviation_json(d: &Deviation) -> serde_json::Value {
    serde_json::json!({
        "id": d.id.to_string(),
        "dataset": d.dataset,
        "layer": d.layer,
        "upstream_ids": d.upstream_ids,
        "suggested_geom": d.suggested_geom,
        "suggested_tags": d.suggested_tags,
        "matched": d.matched,
        "title": d.title,
        "description": d.description,
        "note": d.note,
        "action": d.action,
        "action_at": d.action_at,
    })
}

// --- Handlers ---

pub async fn api_deviations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(100).min(1000) as usize;
    let snapshots = state.engine.snapshots();

    let mut deviations: Vec<serde_json::Value> = Vec::new();
    let mut dataset_slugs: Vec<String> = Vec::new();
    for slug in snapshots.slugs() {
        let Some(snap) = snapshots.get(&slug) else {
            continue;
        };
        for d in &snap.deviations {
            if let Some(ds) = &params.dataset {
                if &d.dataset != ds {
                    continue;
                }
            }
            if let Some(layer) = &params.layer {
                if &d.layer != layer {
                    continue;
                }
            }
            if !dataset_slugs.contains(&d.dataset) {
                dataset_slugs.push(d.dataset.clone());
            }
            deviations.push(deviation_json(d));
            if deviations.len() >= limit {
                break;
            }
        }
        if deviations.len() >= limit {
            break;
        }
    }

    // Join dataset/provider metadata from ingestion.
    let mut datasets = serde_json::Map::new();
    for slug in dataset_slugs {
        match state.store.dataset_meta(&slug).await {
            Ok(Some(meta)) => {
                datasets.insert(slug, serde_json::json!(meta));
            }
            Ok(None) => {}
            Err(e) => warn!(dataset = %slug, error = %e, "Failed to load dataset metadata"),
        }
    }

    Json(serde_json::json!({
        "deviations": deviations,
        "datasets": datasets,
    }))
    .into_response()
}

pub async fn api_deviation_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let uuid = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let Some((ruleset, deviation)) = state.engine.snapshots().find_deviation(uuid) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let dataset_meta = match state.store.dataset_meta(&deviation.dataset).await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(error = %e, "Failed to load dataset metadata");
            None
        }
    };

    // Current live state of the matched feature, for display only. A
    // lookup failure degrades to null rather than failing the detail.
    let live = match deviation.matched {
        Some(f) => match state.osm.feature(f.element, f.id).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(feature = %f, error = %e, "Live feature lookup failed");
                None
            }
        },
        None => None,
    };

    Json(serde_json::json!({
        "deviation": deviation_json(&deviation),
        "ruleset": ruleset,
        "dataset_meta": dataset_meta,
        "live_feature": live,
    }))
    .into_response()
}

pub async fn api_deviation_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActionBody>,
) -> impl IntoResponse {
    let uuid = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let Some(action) = DeviationAction::from_str_loose(&body.action) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown action {:?}", body.action),
        )
            .into_response();
    };

    match state.engine.set_action(uuid, action).await {
        Ok(updated) => Json(serde_json::json!({ "deviation": deviation_json(&updated) }))
            .into_response(),
        Err(MapdriftError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to apply workflow action");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn api_refresh(
    State(state): State<Arc<AppState>>,
    Path(ruleset): Path<String>,
) -> impl IntoResponse {
    match state.engine.refresh(&ruleset).await {
        Ok(stats) => Json(serde_json::json!({
            "ruleset": ruleset,
            "version": stats.version,
            "items": stats.items,
            "features": stats.features,
            "candidates": stats.candidates,
            "missing": stats.missing,
            "tag_mismatch": stats.tag_mismatch,
            "unchanged": stats.unchanged,
            "actions_carried": stats.actions_carried,
            "actions_discarded": stats.actions_discarded,
        }))
        .into_response(),
        Err(MapdriftError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(MapdriftError::RefreshInProgress(_)) => StatusCode::CONFLICT.into_response(),
        Err(e) => {
            warn!(ruleset = %ruleset, error = %e, "Refresh failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
