//! Match Selector: many-to-many candidates down to at most one live
//! feature per upstream item.
//!
//! Lowest score wins; score ties break by ascending feature ref so repeated
//! runs over identical input select identically. No live-feature-side
//! uniqueness: one feature may be the best match for several items, the
//! output is about whether every upstream item is accounted for.

use std::cmp::Ordering;
use std::collections::HashMap;

use mapdrift_common::{FeatureRef, MatchCandidate};

/// Reduce candidates to the best feature per upstream key. Items with no
/// candidates are simply absent from the map.
pub fn select_best(candidates: &[MatchCandidate]) -> HashMap<String, FeatureRef> {
    let mut best: HashMap<String, (f64, FeatureRef)> = HashMap::new();

    for cand in candidates {
        match best.get_mut(&cand.upstream_key) {
            Some(current) => {
                let better = match cand.score.total_cmp(&current.0) {
                    Ordering::Less => true,
                    Ordering::Equal => cand.feature < current.1,
                    Ordering::Greater => false,
                };
                if better {
                    *current = (cand.score, cand.feature);
                }
            }
            None => {
                best.insert(cand.upstream_key.clone(), (cand.score, cand.feature));
            }
        }
    }

    best.into_iter().map(|(k, (_, f))| (k, f)).collect()
}
