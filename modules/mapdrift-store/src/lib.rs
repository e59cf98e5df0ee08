//! Read-only access to the two geometry collections the engine conflates
//! (upstream items and live features), plus persistence for human workflow
//! actions. The engine only ever sees the traits; Postgres backs production
//! and `MemoryStore` backs tests.

pub mod pg;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mapdrift_common::{BBox, DatasetMeta, DeviationAction, LiveFeature, Result, UpstreamItem};

pub use pg::PgStore;

/// Read-only adapter over the upstream item and live feature collections.
/// Region filtering happens here so the pairwise matcher never sees
/// geometry outside the area of interest.
#[async_trait]
pub trait GeometryStore: Send + Sync {
    /// Upstream items of one dataset whose geometry intersects `region`.
    /// Items with no geometry are included; the matcher skips them when
    /// scoring but the classifier still accounts for them.
    async fn upstream_items(&self, dataset: &str, region: &BBox) -> Result<Vec<UpstreamItem>>;

    /// Live features whose geometry intersects `region`.
    async fn live_features(&self, region: &BBox) -> Result<Vec<LiveFeature>>;

    /// Descriptive metadata for a dataset, maintained by ingestion.
    async fn dataset_meta(&self, slug: &str) -> Result<Option<DatasetMeta>>;
}

/// Persisted workflow actions, keyed by (ruleset, upstream key). Deviations
/// are recreated wholesale on refresh; these rows are the human decisions
/// that must survive both refresh and restart.
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn record_action(
        &self,
        ruleset: &str,
        upstream_key: &str,
        action: DeviationAction,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn load_actions(
        &self,
        ruleset: &str,
    ) -> Result<HashMap<String, (DeviationAction, DateTime<Utc>)>>;

    /// Delete actions for upstream keys that stopped producing a deviation.
    /// A later deviation for the same key starts without an action.
    async fn discard_actions(&self, ruleset: &str, upstream_keys: &[String]) -> Result<()>;
}
