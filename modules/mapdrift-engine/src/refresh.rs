//! Refresh pipeline: matcher → selector → classifier → published snapshot.
//!
//! A refresh is a bulk, batch-style pass for one ruleset. It builds the
//! whole snapshot before publishing, so it either fully replaces that
//! ruleset's snapshot or fails leaving the previous one in place. Rulesets
//! refresh independently; a failure in one never disturbs the others.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{error, info};

use mapdrift_common::{
    apply_action, Deviation, DeviationAction, FeatureRef, LiveFeature, MapdriftError, Result,
};
use mapdrift_store::{ActionStore, GeometryStore};

use crate::classifier::{classify, unmatched_live_state};
use crate::matcher::match_candidates;
use crate::ruleset::RulesetRegistry;
use crate::selector::select_best;
use crate::snapshot::{MatchState, Snapshot, SnapshotStore};

/// Stats from one ruleset refresh.
#[derive(Debug)]
pub struct RefreshStats {
    pub version: u64,
    pub items: usize,
    pub features: usize,
    pub candidates: usize,
    pub missing: usize,
    pub tag_mismatch: usize,
    pub unchanged: usize,
    pub actions_carried: usize,
    pub actions_discarded: usize,
}

/// The conflation engine: owns the stores, the ruleset registry, and the
/// published snapshots.
pub struct Engine {
    geometry: Arc<dyn GeometryStore>,
    actions: Arc<dyn ActionStore>,
    registry: RulesetRegistry,
    snapshots: Arc<SnapshotStore>,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes the slug from the in-flight set when the refresh ends, on any
/// exit path.
struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    slug: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.slug);
    }
}

impl Engine {
    pub fn new(
        geometry: Arc<dyn GeometryStore>,
        actions: Arc<dyn ActionStore>,
        registry: RulesetRegistry,
    ) -> Self {
        Self {
            geometry,
            actions,
            registry,
            snapshots: Arc::new(SnapshotStore::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    pub fn registry(&self) -> &RulesetRegistry {
        &self.registry
    }

    /// Rebuild and publish the snapshot for one ruleset. Idempotent: the
    /// same input state produces an equivalent snapshot. Only one refresh
    /// per ruleset runs at a time.
    pub async fn refresh(&self, slug: &str) -> Result<RefreshStats> {
        let ruleset = self
            .registry
            .get(slug)
            .ok_or_else(|| MapdriftError::NotFound(format!("ruleset {slug}")))?;
        ruleset.validate()?;

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(slug.to_string()) {
                return Err(MapdriftError::RefreshInProgress(slug.to_string()));
            }
        }
        let _guard = FlightGuard {
            set: &self.in_flight,
            slug: slug.to_string(),
        };

        let start = std::time::Instant::now();

        let items = self
            .geometry
            .upstream_items(&ruleset.dataset, &ruleset.region)
            .await?;
        let features = self.geometry.live_features(&ruleset.region).await?;
        let persisted_actions = self.actions.load_actions(slug).await?;

        let candidates = match_candidates(&items, &features, &ruleset);
        let best = select_best(&candidates);

        let by_ref: HashMap<FeatureRef, &LiveFeature> =
            features.iter().map(|f| (f.feature, f)).collect();

        let mut deviations: Vec<Deviation> = Vec::new();
        let mut states: Vec<MatchState> = Vec::new();
        let (mut missing, mut tag_mismatch, mut unchanged) = (0usize, 0usize, 0usize);

        for item in &items {
            let selected = best
                .get(&item.key())
                .and_then(|feature_ref| by_ref.get(feature_ref).copied());
            let classified = classify(item, selected, &ruleset);
            states.push(classified.state);
            match classified.deviation {
                Some(d) if d.matched.is_some() => {
                    tag_mismatch += 1;
                    deviations.push(d);
                }
                Some(d) => {
                    missing += 1;
                    deviations.push(d);
                }
                None => unchanged += 1,
            }
        }

        if ruleset.surface_unmatched_live {
            let selected_refs: HashSet<FeatureRef> = best.values().copied().collect();
            states.extend(
                features
                    .iter()
                    .filter(|f| !selected_refs.contains(&f.feature))
                    .map(unmatched_live_state),
            );
        }

        // Human decisions survive the wholesale rebuild, keyed by upstream
        // id set. A key that stopped producing a deviation drops its action
        // from the store too, so a later deviation for the same key starts
        // clean.
        let deviation_keys: HashSet<String> =
            deviations.iter().map(|d| d.upstream_key()).collect();
        let stale: Vec<String> = persisted_actions
            .keys()
            .filter(|k| !deviation_keys.contains(*k))
            .cloned()
            .collect();
        if !stale.is_empty() {
            self.actions.discard_actions(slug, &stale).await?;
        }

        let mut actions_carried = 0usize;
        for deviation in &mut deviations {
            if let Some((action, at)) = persisted_actions.get(&deviation.upstream_key()) {
                *deviation = apply_action(deviation, *action, *at);
                actions_carried += 1;
            }
        }

        let version = self.snapshots.next_version();
        let snapshot = Snapshot::new(slug.to_string(), version, deviations, states);
        let stats = RefreshStats {
            version,
            items: items.len(),
            features: features.len(),
            candidates: candidates.len(),
            missing,
            tag_mismatch,
            unchanged,
            actions_carried,
            actions_discarded: stale.len(),
        };
        self.snapshots.publish(snapshot);

        info!(
            ruleset = slug,
            version,
            items = stats.items,
            features = stats.features,
            candidates = stats.candidates,
            missing = stats.missing,
            tag_mismatch = stats.tag_mismatch,
            unchanged = stats.unchanged,
            actions_carried = stats.actions_carried,
            actions_discarded = stats.actions_discarded,
            elapsed_ms = start.elapsed().as_millis(),
            "Snapshot refreshed"
        );

        Ok(stats)
    }

    /// Refresh every registered ruleset, isolating failures per ruleset.
    pub async fn refresh_all(&self) {
        for slug in self.registry.slugs() {
            if let Err(e) = self.refresh(&slug).await {
                error!(ruleset = %slug, error = %e, "Refresh failed, keeping previous snapshot");
            }
        }
    }

    /// Apply a human workflow action to a deviation: persist it, then swap
    /// the updated record into the published snapshot. Concurrent updates
    /// to the same deviation are last-write-wins.
    pub async fn set_action(
        &self,
        id: uuid::Uuid,
        action: DeviationAction,
    ) -> Result<Deviation> {
        let (slug, deviation) = self
            .snapshots
            .find_deviation(id)
            .ok_or_else(|| MapdriftError::NotFound(format!("deviation {id}")))?;

        let now = Utc::now();
        self.actions
            .record_action(&slug, &deviation.upstream_key(), action, now)
            .await?;

        self.snapshots
            .set_action(id, action, now)
            .ok_or_else(|| MapdriftError::NotFound(format!("deviation {id}")))
    }

    /// Spawn a background loop that refreshes all rulesets on a timer.
    pub fn spawn_refresh_loop(self: &Arc<Self>, minutes: u64) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_secs(minutes * 60);
            loop {
                tokio::time::sleep(interval).await;
                engine.refresh_all().await;
            }
        });
        info!(interval_minutes = minutes, "Snapshot refresh loop started");
    }
}
