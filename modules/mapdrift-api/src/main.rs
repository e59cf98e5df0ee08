use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mapdrift_common::Config;
use mapdrift_engine::Engine;
use mapdrift_store::PgStore;
use mapdrift_tiles::TileGrid;
use osm_client::OsmClient;

mod rest;
mod rulesets;
mod tiles;

pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<PgStore>,
    pub osm: OsmClient,
    pub grid: TileGrid,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mapdrift=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let ruleset_path =
        std::env::var("MATCH_RULESETS").unwrap_or_else(|_| "rulesets.json".to_string());
    let registry = rulesets::load_rulesets(&ruleset_path)?;
    info!(path = %ruleset_path, rulesets = registry.slugs().len(), "Rulesets loaded");

    let engine = Arc::new(Engine::new(store.clone(), store.clone(), registry));

    // Publish initial snapshots before serving, then keep them fresh.
    engine.refresh_all().await;
    engine.spawn_refresh_loop(config.refresh_minutes);

    let state = Arc::new(AppState {
        engine,
        store,
        osm: OsmClient::new(&config.osm_api_url),
        grid: TileGrid::default(),
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Deviation feed
        .route("/api/deviations", get(rest::api_deviations))
        .route("/api/deviations/{id}", get(rest::api_deviation_detail))
        .route("/api/deviations/{id}/action", post(rest::api_deviation_action))
        // Refresh trigger (external scheduler entry point)
        .route("/api/refresh/{ruleset}", post(rest::api_refresh))
        // Vector tiles
        .route("/tiles/{ruleset}/{z}/{x}/{y}.mvt", get(tiles::api_tile))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path + status + latency
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Mapdrift API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
