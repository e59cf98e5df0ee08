// Postgres-backed geometry and action stores. Geometry and tags live in
// JSONB columns; the per-row bbox columns exist so region filtering stays
// in SQL instead of scanning whole datasets into memory.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use mapdrift_common::{
    BBox, DatasetMeta, DeviationAction, ElementType, FeatureRef, Geometry, LiveFeature,
    MapdriftError, Result, Tags, UpstreamItem,
};

use crate::{ActionStore, GeometryStore};

pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct UpstreamRow {
    ids: Vec<String>,
    tags: serde_json::Value,
    geom: Option<serde_json::Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct FeatureRow {
    element: String,
    id: i64,
    tags: serde_json::Value,
    geom: Option<serde_json::Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct DatasetRow {
    slug: String,
    name: String,
    provider: String,
    source_url: String,
    license: String,
    fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    upstream_key: String,
    action: String,
    action_at: DateTime<Utc>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| MapdriftError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MapdriftError::Database(e.to_string()))?;
        Ok(())
    }
}

fn parse_tags(value: serde_json::Value) -> Tags {
    // Null tag columns count as an empty mapping, not an error.
    serde_json::from_value(value).unwrap_or_default()
}

fn parse_geom(value: Option<serde_json::Value>) -> Option<Geometry> {
    value.and_then(|v| match serde_json::from_value(v) {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable geometry column");
            None
        }
    })
}

#[async_trait]
impl GeometryStore for PgStore {
    async fn upstream_items(&self, dataset: &str, region: &BBox) -> Result<Vec<UpstreamItem>> {
        let rows = sqlx::query_as::<_, UpstreamRow>(
            r#"
            SELECT ids, tags, geom FROM upstream_items
            WHERE dataset = $1
              AND (geom IS NULL
                   OR (min_x <= $4 AND max_x >= $2 AND min_y <= $5 AND max_y >= $3))
            "#,
        )
        .bind(dataset)
        .bind(region.min_x)
        .bind(region.min_y)
        .bind(region.max_x)
        .bind(region.max_y)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| UpstreamItem {
                ids: r.ids.into_iter().collect::<BTreeSet<_>>(),
                tags: parse_tags(r.tags),
                geometry: parse_geom(r.geom),
            })
            .collect())
    }

    async fn live_features(&self, region: &BBox) -> Result<Vec<LiveFeature>> {
        let rows = sqlx::query_as::<_, FeatureRow>(
            r#"
            SELECT element, id, tags, geom FROM live_features
            WHERE min_x <= $3 AND max_x >= $1 AND min_y <= $4 AND max_y >= $2
            "#,
        )
        .bind(region.min_x)
        .bind(region.min_y)
        .bind(region.max_x)
        .bind(region.max_y)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let element = ElementType::from_str_loose(&r.element)?;
                Some(LiveFeature {
                    feature: FeatureRef { element, id: r.id },
                    tags: parse_tags(r.tags),
                    geometry: parse_geom(r.geom),
                })
            })
            .collect())
    }

    async fn dataset_meta(&self, slug: &str) -> Result<Option<DatasetMeta>> {
        let row = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT slug, name, provider, source_url, license, fetched_at
            FROM datasets WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;

        Ok(row.map(|r| DatasetMeta {
            slug: r.slug,
            name: r.name,
            provider: r.provider,
            source_url: r.source_url,
            license: r.license,
            fetched_at: r.fetched_at,
        }))
    }
}

#[async_trait]
impl ActionStore for PgStore {
    async fn record_action(
        &self,
        ruleset: &str,
        upstream_key: &str,
        action: DeviationAction,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deviation_actions (ruleset, upstream_key, action, action_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ruleset, upstream_key)
            DO UPDATE SET action = EXCLUDED.action, action_at = EXCLUDED.action_at
            "#,
        )
        .bind(ruleset)
        .bind(upstream_key)
        .bind(action.to_string())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;
        Ok(())
    }

    async fn load_actions(
        &self,
        ruleset: &str,
    ) -> Result<HashMap<String, (DeviationAction, DateTime<Utc>)>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT upstream_key, action, action_at
            FROM deviation_actions WHERE ruleset = $1
            "#,
        )
        .bind(ruleset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let action = DeviationAction::from_str_loose(&r.action)?;
                Some((r.upstream_key, (action, r.action_at)))
            })
            .collect())
    }

    async fn discard_actions(&self, ruleset: &str, upstream_keys: &[String]) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM deviation_actions
            WHERE ruleset = $1 AND upstream_key = ANY($2)
            "#,
        )
        .bind(ruleset)
        .bind(upstream_keys)
        .execute(&self.pool)
        .await
        .map_err(|e| MapdriftError::Database(e.to_string()))?;
        Ok(())
    }
}
