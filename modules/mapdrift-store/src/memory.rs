//! In-memory store for tests. Same trait surface as [`PgStore`], no
//! database required; region filtering runs against geometry bboxes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mapdrift_common::{
    BBox, DatasetMeta, DeviationAction, LiveFeature, Result, UpstreamItem,
};

use crate::{ActionStore, GeometryStore};

#[derive(Default)]
pub struct MemoryStore {
    items: HashMap<String, Vec<UpstreamItem>>,
    features: Mutex<Vec<LiveFeature>>,
    datasets: HashMap<String, DatasetMeta>,
    actions: Mutex<HashMap<(String, String), (DeviationAction, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, meta: DatasetMeta, items: Vec<UpstreamItem>) -> Self {
        self.items.insert(meta.slug.clone(), items);
        self.datasets.insert(meta.slug.clone(), meta);
        self
    }

    pub fn with_features(self, features: Vec<LiveFeature>) -> Self {
        *self.features.lock().unwrap() = features;
        self
    }

    /// Replace the live feature set, simulating edits between refreshes.
    pub fn set_features(&self, features: Vec<LiveFeature>) {
        *self.features.lock().unwrap() = features;
    }
}

#[async_trait]
impl GeometryStore for MemoryStore {
    async fn upstream_items(&self, dataset: &str, region: &BBox) -> Result<Vec<UpstreamItem>> {
        Ok(self
            .items
            .get(dataset)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| match &i.geometry {
                        Some(g) => g.intersects_bbox(region),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn live_features(&self, region: &BBox) -> Result<Vec<LiveFeature>> {
        Ok(self
            .features
            .lock()
            .unwrap()
            .iter()
            .filter(|f| {
                f.geometry
                    .as_ref()
                    .map(|g| g.intersects_bbox(region))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn dataset_meta(&self, slug: &str) -> Result<Option<DatasetMeta>> {
        Ok(self.datasets.get(slug).cloned())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn record_action(
        &self,
        ruleset: &str,
        upstream_key: &str,
        action: DeviationAction,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.actions
            .lock()
            .unwrap()
            .insert((ruleset.to_string(), upstream_key.to_string()), (action, at));
        Ok(())
    }

    async fn load_actions(
        &self,
        ruleset: &str,
    ) -> Result<HashMap<String, (DeviationAction, DateTime<Utc>)>> {
        Ok(self
            .actions
            .lock()
            .unwrap()
            .iter()
            .filter(|((r, _), _)| r == ruleset)
            .map(|((_, key), v)| (key.clone(), *v))
            .collect())
    }

    async fn discard_actions(&self, ruleset: &str, upstream_keys: &[String]) -> Result<()> {
        self.actions
            .lock()
            .unwrap()
            .retain(|(r, key), _| r != ruleset || !upstream_keys.contains(key));
        Ok(())
    }
}
