//! Candidate Matcher: the spatial join.
//!
//! For each upstream item, every live feature within the distance threshold
//! becomes a scored candidate pair. Both sides are restricted to the
//! ruleset's region first so the pairwise pass stays tractable at dataset
//! scale. All distances are storage-CRS meters.

use mapdrift_common::{LiveFeature, MatchCandidate, UpstreamItem};

use crate::ruleset::MatchRuleset;

/// Produce all scored (upstream, live) pairs within the ruleset's
/// threshold. Items or features without geometry are excluded from
/// scoring; an item with no candidates is a valid outcome, not an error.
pub fn match_candidates(
    items: &[UpstreamItem],
    features: &[LiveFeature],
    ruleset: &MatchRuleset,
) -> Vec<MatchCandidate> {
    // The store already filters by region; re-check here so the matcher's
    // contract holds regardless of what a caller hands it.
    let in_region: Vec<&LiveFeature> = features
        .iter()
        .filter(|f| {
            f.geometry
                .as_ref()
                .map(|g| g.intersects_bbox(&ruleset.region))
                .unwrap_or(false)
        })
        .collect();

    let mut candidates = Vec::new();
    for item in items {
        let Some(item_geom) = &item.geometry else {
            continue;
        };
        if !item_geom.intersects_bbox(&ruleset.region) {
            continue;
        }
        let key = item.key();
        for feature in &in_region {
            let Some(feat_geom) = &feature.geometry else {
                continue;
            };
            let distance_m = item_geom.distance(feat_geom);
            if distance_m <= ruleset.threshold_m {
                candidates.push(MatchCandidate {
                    upstream_key: key.clone(),
                    feature: feature.feature,
                    score: ruleset.scorer.score(item, feature, distance_m),
                });
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapdrift_common::{tags, BBox, ElementType, FeatureRef, Geometry, Point, Tags};
    use std::collections::BTreeSet;

    fn item(id: &str, x: f64, y: f64) -> UpstreamItem {
        UpstreamItem {
            ids: BTreeSet::from([id.to_string()]),
            geometry: Some(Geometry::Point(Point::new(x, y))),
            tags: tags([("information", "sign")]),
        }
    }

    fn feature(id: i64, x: f64, y: f64) -> LiveFeature {
        LiveFeature {
            feature: FeatureRef {
                element: ElementType::Node,
                id,
            },
            tags: Tags::new(),
            geometry: Some(Geometry::Point(Point::new(x, y))),
        }
    }

    fn ruleset() -> MatchRuleset {
        MatchRuleset::new(
            "test",
            "signs",
            "default",
            BBox::new(0.0, 0.0, 1000.0, 1000.0),
            50.0,
        )
    }

    #[test]
    fn pairs_within_threshold_are_candidates() {
        let items = vec![item("a", 100.0, 100.0)];
        let features = vec![feature(1, 130.0, 100.0), feature(2, 200.0, 100.0)];
        let cands = match_candidates(&items, &features, &ruleset());
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].feature.id, 1);
        assert!((cands[0].score - 30.0).abs() < 1e-9);
    }

    #[test]
    fn no_candidates_beyond_threshold() {
        let items = vec![item("a", 100.0, 100.0)];
        let features = vec![feature(1, 100.0, 151.0)];
        assert!(match_candidates(&items, &features, &ruleset()).is_empty());
    }

    #[test]
    fn null_geometry_is_skipped_not_an_error() {
        let mut no_geom = item("a", 0.0, 0.0);
        no_geom.geometry = None;
        let mut bare_feature = feature(1, 100.0, 100.0);
        bare_feature.geometry = None;
        let cands = match_candidates(
            &[no_geom, item("b", 100.0, 100.0)],
            &[bare_feature, feature(2, 110.0, 100.0)],
            &ruleset(),
        );
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].upstream_key, "b");
        assert_eq!(cands[0].feature.id, 2);
    }

    #[test]
    fn features_outside_region_are_ignored() {
        let items = vec![item("a", 990.0, 990.0)];
        // Within threshold of the item but outside the region bbox.
        let features = vec![feature(1, 1020.0, 990.0)];
        assert!(match_candidates(&items, &features, &ruleset()).is_empty());
    }

    #[test]
    fn one_item_can_have_many_candidates() {
        let items = vec![item("a", 100.0, 100.0)];
        let features = vec![feature(1, 110.0, 100.0), feature(2, 100.0, 120.0)];
        assert_eq!(match_candidates(&items, &features, &ruleset()).len(), 2);
    }
}
