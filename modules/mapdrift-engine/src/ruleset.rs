//! Per-dataset matching configuration.
//!
//! The source of truth for how one dataset/region pair is conflated: region
//! filter, distance threshold, scoring function, tag derivation. One engine
//! parameterized by these records replaces a handwritten matching procedure
//! per dataset.

use std::collections::HashMap;
use std::sync::Arc;

use mapdrift_common::{BBox, LiveFeature, MapdriftError, Result, Tags, UpstreamItem};

/// Scores one (upstream, live) candidate pair. Lower is better. The
/// precomputed minimum geometry distance in meters is passed in; a scorer
/// may weight it by tag similarity or anything else it can see on the pair.
pub trait Scorer: Send + Sync {
    fn score(&self, item: &UpstreamItem, feature: &LiveFeature, distance_m: f64) -> f64;
}

/// Default scorer: plain distance.
pub struct DistanceScorer;

impl Scorer for DistanceScorer {
    fn score(&self, _item: &UpstreamItem, _feature: &LiveFeature, distance_m: f64) -> f64 {
        distance_m
    }
}

/// Derives the tag set an upstream item implies for the live database.
/// The classifier diffs this against the matched feature's live tags.
pub trait TagDeriver: Send + Sync {
    fn derive(&self, item: &UpstreamItem) -> Tags;
}

/// Default deriver: the item's tags verbatim.
pub struct IdentityTags;

impl TagDeriver for IdentityTags {
    fn derive(&self, item: &UpstreamItem) -> Tags {
        item.tags.clone()
    }
}

/// Configuration record for one dataset/region conflation.
#[derive(Clone)]
pub struct MatchRuleset {
    /// Identifier used by the tile endpoint and the refresh trigger.
    pub slug: String,
    pub dataset: String,
    pub layer: String,
    /// Area of interest in storage CRS meters. Filtering to this region is
    /// purely a performance measure; it bounds the pairwise join.
    pub region: BBox,
    /// Maximum geometry distance for a candidate pair, meters.
    pub threshold_m: f64,
    /// When true, live features in the region that no upstream item
    /// selected are surfaced to the tile renderer as `not-in-upstream`.
    pub surface_unmatched_live: bool,
    pub scorer: Arc<dyn Scorer>,
    pub tag_deriver: Arc<dyn TagDeriver>,
}

impl MatchRuleset {
    pub fn new(slug: &str, dataset: &str, layer: &str, region: BBox, threshold_m: f64) -> Self {
        Self {
            slug: slug.to_string(),
            dataset: dataset.to_string(),
            layer: layer.to_string(),
            region,
            threshold_m,
            surface_unmatched_live: false,
            scorer: Arc::new(DistanceScorer),
            tag_deriver: Arc::new(IdentityTags),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_tag_deriver(mut self, deriver: Arc<dyn TagDeriver>) -> Self {
        self.tag_deriver = deriver;
        self
    }

    pub fn surfacing_unmatched_live(mut self) -> Self {
        self.surface_unmatched_live = true;
        self
    }

    /// A malformed region or threshold is a fatal configuration error for
    /// this ruleset: its refresh must fail outright rather than publish a
    /// partial snapshot.
    pub fn validate(&self) -> Result<()> {
        if !self.region.is_valid() {
            return Err(MapdriftError::Config(format!(
                "ruleset {}: degenerate region bbox",
                self.slug
            )));
        }
        if !(self.threshold_m > 0.0) {
            return Err(MapdriftError::Config(format!(
                "ruleset {}: distance threshold must be positive, got {}",
                self.slug, self.threshold_m
            )));
        }
        Ok(())
    }
}

/// All configured rulesets, keyed by slug.
#[derive(Default)]
pub struct RulesetRegistry {
    by_slug: HashMap<String, Arc<MatchRuleset>>,
}

impl RulesetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ruleset: MatchRuleset) {
        self.by_slug.insert(ruleset.slug.clone(), Arc::new(ruleset));
    }

    pub fn get(&self, slug: &str) -> Option<Arc<MatchRuleset>> {
        self.by_slug.get(slug).cloned()
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.by_slug.keys().cloned().collect();
        slugs.sort();
        slugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_region_fails_validation() {
        let rs = MatchRuleset::new("x", "d", "l", BBox::new(10.0, 0.0, 0.0, 10.0), 50.0);
        assert!(rs.validate().is_err());
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let rs = MatchRuleset::new("x", "d", "l", BBox::new(0.0, 0.0, 1.0, 1.0), 0.0);
        assert!(rs.validate().is_err());
    }

    #[test]
    fn registry_lists_slugs_sorted() {
        let mut reg = RulesetRegistry::new();
        reg.insert(MatchRuleset::new("b", "d", "l", BBox::new(0.0, 0.0, 1.0, 1.0), 1.0));
        reg.insert(MatchRuleset::new("a", "d", "l", BBox::new(0.0, 0.0, 1.0, 1.0), 1.0));
        assert_eq!(reg.slugs(), vec!["a".to_string(), "b".to_string()]);
        assert!(reg.get("a").is_some());
        assert!(reg.get("c").is_none());
    }
}
