//! Versioned match-result snapshots and their atomically swapped store.
//!
//! A refresh builds a complete `Snapshot` off to the side and publishes it
//! in one `ArcSwap` step; readers hold an `Arc` to a specific version for
//! the duration of a request and never observe a half-written refresh.
//! Failure of one ruleset's refresh leaves every published snapshot alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mapdrift_common::{
    apply_action, Deviation, DeviationAction, FeatureRef, Geometry, Tags,
};

/// How a match state renders on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// Upstream and live geometry both present: drawn as a line between
    /// centroids to visualize the positional offset.
    InBoth,
    /// Upstream only: the object is absent from the live database.
    NotInLive,
    /// Live only: a candidate feature no upstream item selected, surfaced
    /// when the ruleset opts in.
    NotInUpstream,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::InBoth => write!(f, "in-both"),
            MatchKind::NotInLive => write!(f, "not-in-live"),
            MatchKind::NotInUpstream => write!(f, "not-in-upstream"),
        }
    }
}

/// One upstream item's (or surfaced live feature's) resolved match state,
/// as consumed by the tile renderer.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub kind: MatchKind,
    pub upstream_key: Option<String>,
    pub upstream_geom: Option<Geometry>,
    pub live_geom: Option<Geometry>,
    pub feature: Option<FeatureRef>,
    /// Upstream tag mapping, carried onto tile features for display.
    pub tags: Tags,
}

/// Immutable materialization of one ruleset's matcher + selector +
/// classifier output.
pub struct Snapshot {
    pub ruleset: String,
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub deviations: Vec<Deviation>,
    pub states: Vec<MatchState>,
    by_id: HashMap<Uuid, usize>,
    by_upstream_key: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new(
        ruleset: String,
        version: u64,
        deviations: Vec<Deviation>,
        states: Vec<MatchState>,
    ) -> Self {
        let by_id = deviations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();
        let by_upstream_key = deviations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.upstream_key(), i))
            .collect();
        Self {
            ruleset,
            version,
            generated_at: Utc::now(),
            deviations,
            states,
            by_id,
            by_upstream_key,
        }
    }

    pub fn deviation(&self, id: Uuid) -> Option<&Deviation> {
        self.by_id.get(&id).map(|&i| &self.deviations[i])
    }

    pub fn deviation_by_upstream_key(&self, key: &str) -> Option<&Deviation> {
        self.by_upstream_key.get(key).map(|&i| &self.deviations[i])
    }

    /// Copy of this snapshot with one deviation's action fields updated.
    /// Same version: actions are review state, not derived match state.
    fn with_action(&self, id: Uuid, action: DeviationAction, at: DateTime<Utc>) -> Option<Snapshot> {
        let idx = *self.by_id.get(&id)?;
        let mut deviations = self.deviations.clone();
        deviations[idx] = apply_action(&deviations[idx], action, at);
        Some(Snapshot {
            ruleset: self.ruleset.clone(),
            version: self.version,
            generated_at: self.generated_at,
            deviations,
            states: self.states.clone(),
            by_id: self.by_id.clone(),
            by_upstream_key: self.by_upstream_key.clone(),
        })
    }
}

/// Thread-safe snapshot store: one published snapshot per ruleset slug,
/// swapped atomically, read lock-free.
#[derive(Default)]
pub struct SnapshotStore {
    inner: ArcSwap<HashMap<String, Arc<Snapshot>>>,
    next_version: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
            next_version: AtomicU64::new(1),
        }
    }

    /// Version number for a snapshot about to be built.
    pub fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Current snapshot for a ruleset, if one has been published.
    pub fn get(&self, slug: &str) -> Option<Arc<Snapshot>> {
        self.inner.load().get(slug).cloned()
    }

    /// Publish a fully built snapshot for its ruleset. Other rulesets'
    /// snapshots are untouched.
    pub fn publish(&self, snapshot: Snapshot) {
        let slug = snapshot.ruleset.clone();
        let snapshot = Arc::new(snapshot);
        self.inner.rcu(|map| {
            let mut next = HashMap::clone(map);
            next.insert(slug.clone(), Arc::clone(&snapshot));
            next
        });
    }

    /// Find a deviation by id across all published snapshots.
    pub fn find_deviation(&self, id: Uuid) -> Option<(String, Deviation)> {
        let map = self.inner.load();
        for (slug, snap) in map.iter() {
            if let Some(d) = snap.deviation(id) {
                return Some((slug.clone(), d.clone()));
            }
        }
        None
    }

    /// Apply a workflow action to a published deviation, last-write-wins.
    /// Returns the updated record, or `None` if no snapshot contains the id.
    pub fn set_action(
        &self,
        id: Uuid,
        action: DeviationAction,
        at: DateTime<Utc>,
    ) -> Option<Deviation> {
        let mut updated: Option<Deviation> = None;
        self.inner.rcu(|map| {
            let mut next = HashMap::clone(map);
            for (slug, snap) in map.iter() {
                if let Some(new_snap) = snap.with_action(id, action, at) {
                    updated = new_snap.deviation(id).cloned();
                    next.insert(slug.clone(), Arc::new(new_snap));
                    break;
                }
            }
            next
        });
        updated
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.inner.load().keys().cloned().collect();
        slugs.sort();
        slugs
    }
}
