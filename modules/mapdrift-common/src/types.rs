use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geom::Geometry;
use crate::tags::Tags;

// --- Live feature identity ---

/// Geometry primitive kind in the live feature database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::Node => write!(f, "node"),
            ElementType::Way => write!(f, "way"),
            ElementType::Relation => write!(f, "relation"),
        }
    }
}

impl ElementType {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "node" | "n" => Some(Self::Node),
            "way" | "w" => Some(Self::Way),
            "relation" | "rel" | "r" => Some(Self::Relation),
            _ => None,
        }
    }
}

/// Reference to a live feature. `Ord` is the selector's tie-break order:
/// element type first, then ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FeatureRef {
    pub element: ElementType,
    pub id: i64,
}

impl std::fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.element, self.id)
    }
}

// --- Matcher inputs ---

/// A record from the external authoritative dataset. Multiple source rows
/// may collapse into one conflation unit, hence the id set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamItem {
    pub ids: BTreeSet<String>,
    pub geometry: Option<Geometry>,
    pub tags: Tags,
}

impl UpstreamItem {
    /// Stable identity for the whole conflation unit: the sorted id set
    /// joined with `;`. Used for deviation ids and action carry-forward.
    pub fn key(&self) -> String {
        self.ids.iter().cloned().collect::<Vec<_>>().join(";")
    }
}

/// An existing mapped object in the live geospatial database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFeature {
    pub feature: FeatureRef,
    pub tags: Tags,
    pub geometry: Option<Geometry>,
}

/// One scored (upstream, live) pair. Ephemeral: produced per matching
/// pass, never persisted. Lower score = better match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub upstream_key: String,
    pub feature: FeatureRef,
    pub score: f64,
}

// --- Deviations ---

/// Human workflow decision on a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DeviationAction {
    Fixed,
    AlreadyFixed,
    NotAnIssue,
    Deferred,
}

impl std::fmt::Display for DeviationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviationAction::Fixed => write!(f, "fixed"),
            DeviationAction::AlreadyFixed => write!(f, "already-fixed"),
            DeviationAction::NotAnIssue => write!(f, "not-an-issue"),
            DeviationAction::Deferred => write!(f, "deferred"),
        }
    }
}

impl DeviationAction {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "already-fixed" | "already_fixed" => Some(Self::AlreadyFixed),
            "not-an-issue" | "not_an_issue" => Some(Self::NotAnIssue),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }
}

/// A detected discrepancy between an upstream item and the live database,
/// presented for human review.
///
/// Invariants: `suggested_geom` is set iff there is no match;
/// `suggested_tags` is set iff there is a match with a nonempty tag diff;
/// `action` and `action_at` are set together, only via [`apply_action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deviation {
    pub id: Uuid,
    pub dataset: String,
    pub layer: String,
    pub upstream_ids: BTreeSet<String>,
    pub suggested_geom: Option<Geometry>,
    pub suggested_tags: Option<Tags>,
    pub matched: Option<FeatureRef>,
    pub title: String,
    pub description: String,
    pub note: String,
    pub action: Option<DeviationAction>,
    pub action_at: Option<DateTime<Utc>>,
}

impl Deviation {
    /// The conflation unit's stable identity, matching [`UpstreamItem::key`].
    pub fn upstream_key(&self) -> String {
        self.upstream_ids.iter().cloned().collect::<Vec<_>>().join(";")
    }
}

/// Deterministic deviation id from ruleset slug + upstream key, so the id
/// survives snapshot recreation across refreshes.
pub fn deviation_id(ruleset: &str, upstream_key: &str) -> Uuid {
    let name = format!("{ruleset}\u{1f}{upstream_key}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// State transition for a human workflow decision. Pure so the mutation
/// handler's side effect stays testable in isolation; the server assigns
/// `now`, concurrent calls on the same deviation are last-write-wins.
pub fn apply_action(old: &Deviation, action: DeviationAction, now: DateTime<Utc>) -> Deviation {
    Deviation {
        action: Some(action),
        action_at: Some(now),
        ..old.clone()
    }
}

// --- Dataset metadata ---

/// Descriptive metadata for a dataset, supplied by the ingestion
/// collaborator and joined into feed responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetMeta {
    pub slug: String,
    pub name: String,
    pub provider: String,
    pub source_url: String,
    pub license: String,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{tags, Tags};

    fn sample_deviation() -> Deviation {
        let ids: BTreeSet<String> = ["a-1".to_string()].into();
        Deviation {
            id: deviation_id("hydrants", "a-1"),
            dataset: "hydrants".into(),
            layer: "default".into(),
            upstream_ids: ids,
            suggested_geom: None,
            suggested_tags: Some(tags([("emergency", "fire_hydrant")])),
            matched: Some(FeatureRef {
                element: ElementType::Node,
                id: 42,
            }),
            title: "tag mismatch".into(),
            description: String::new(),
            note: String::new(),
            action: None,
            action_at: None,
        }
    }

    #[test]
    fn apply_action_sets_both_fields() {
        let d = sample_deviation();
        let now = Utc::now();
        let updated = apply_action(&d, DeviationAction::Fixed, now);
        assert_eq!(updated.action, Some(DeviationAction::Fixed));
        assert_eq!(updated.action_at, Some(now));
        // everything else untouched
        assert_eq!(updated.id, d.id);
        assert_eq!(updated.suggested_tags, d.suggested_tags);
    }

    #[test]
    fn deviation_id_is_stable_and_scoped() {
        assert_eq!(deviation_id("hydrants", "a-1"), deviation_id("hydrants", "a-1"));
        assert_ne!(deviation_id("hydrants", "a-1"), deviation_id("benches", "a-1"));
        assert_ne!(deviation_id("hydrants", "a-1"), deviation_id("hydrants", "a-2"));
    }

    #[test]
    fn upstream_key_joins_sorted_ids() {
        let item = UpstreamItem {
            ids: ["b".to_string(), "a".to_string()].into(),
            geometry: None,
            tags: Tags::new(),
        };
        assert_eq!(item.key(), "a;b");
    }

    #[test]
    fn feature_ref_orders_by_element_then_id() {
        let n1 = FeatureRef { element: ElementType::Node, id: 1 };
        let n2 = FeatureRef { element: ElementType::Node, id: 2 };
        let w1 = FeatureRef { element: ElementType::Way, id: 1 };
        assert!(n1 < n2);
        assert!(n2 < w1);
    }

    #[test]
    fn action_serializes_kebab_case() {
        let json = serde_json::to_string(&DeviationAction::AlreadyFixed).unwrap();
        assert_eq!(json, "\"already-fixed\"");
        assert_eq!(
            DeviationAction::from_str_loose("not-an-issue"),
            Some(DeviationAction::NotAnIssue)
        );
    }
}
