//! Deviation Classifier: resolved match (or its absence) → deviation
//! record, or silence.
//!
//! Three terminal states per upstream item: no match within threshold
//! ("missing"), matched with a nonempty tag diff ("tag mismatch"), matched
//! with identical derived tags (no deviation materialized at all).

use mapdrift_common::{
    deviation_id, tag_diff, Deviation, LiveFeature, UpstreamItem,
};

use crate::ruleset::MatchRuleset;
use crate::snapshot::{MatchKind, MatchState};

/// Classification of one upstream item: the match state the tile renderer
/// draws, and the deviation (if any) the review feed shows.
pub struct Classified {
    pub state: MatchState,
    pub deviation: Option<Deviation>,
}

/// Classify one upstream item against its selected live feature.
pub fn classify(
    item: &UpstreamItem,
    selected: Option<&LiveFeature>,
    ruleset: &MatchRuleset,
) -> Classified {
    let key = item.key();
    let derived = ruleset.tag_deriver.derive(item);

    match selected {
        None => {
            let deviation = Deviation {
                id: deviation_id(&ruleset.slug, &key),
                dataset: ruleset.dataset.clone(),
                layer: ruleset.layer.clone(),
                upstream_ids: item.ids.clone(),
                suggested_geom: item.geometry.clone(),
                suggested_tags: None,
                matched: None,
                title: "missing".to_string(),
                description: format!(
                    "Object from {} not found in the live database within {} m of its registered position.",
                    ruleset.dataset, ruleset.threshold_m
                ),
                note: String::new(),
                action: None,
                action_at: None,
            };
            Classified {
                state: MatchState {
                    kind: MatchKind::NotInLive,
                    upstream_key: Some(key),
                    upstream_geom: item.geometry.clone(),
                    live_geom: None,
                    feature: None,
                    tags: derived,
                },
                deviation: Some(deviation),
            }
        }
        Some(feature) => {
            let diff = tag_diff(&derived, &feature.tags);
            let state = MatchState {
                kind: MatchKind::InBoth,
                upstream_key: Some(key.clone()),
                upstream_geom: item.geometry.clone(),
                live_geom: feature.geometry.clone(),
                feature: Some(feature.feature),
                tags: derived,
            };
            if diff.is_empty() {
                // Matched and agreeing: no deviation is materialized.
                return Classified {
                    state,
                    deviation: None,
                };
            }
            let deviation = Deviation {
                id: deviation_id(&ruleset.slug, &key),
                dataset: ruleset.dataset.clone(),
                layer: ruleset.layer.clone(),
                upstream_ids: item.ids.clone(),
                suggested_geom: None,
                suggested_tags: Some(diff.clone()),
                matched: Some(feature.feature),
                title: "tag mismatch".to_string(),
                description: format!(
                    "Matched {} but {} tag(s) differ from the upstream-derived values.",
                    feature.feature,
                    diff.len()
                ),
                note: String::new(),
                action: None,
                action_at: None,
            };
            Classified {
                state,
                deviation: Some(deviation),
            }
        }
    }
}

/// A live feature in the region that no upstream item selected. Not a
/// deviation; surfaced to the renderer only when the ruleset opts in.
pub fn unmatched_live_state(feature: &LiveFeature) -> MatchState {
    MatchState {
        kind: MatchKind::NotInUpstream,
        upstream_key: None,
        upstream_geom: None,
        live_geom: feature.geometry.clone(),
        feature: Some(feature.feature),
        tags: feature.tags.clone(),
    }
}
