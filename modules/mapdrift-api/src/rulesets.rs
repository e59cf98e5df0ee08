//! Deployment ruleset configuration, loaded from a JSON file.
//!
//! Scoring and tag derivation stay code-level (the defaults cover the
//! plain-distance case); the file configures the per-dataset knobs:
//! region, threshold, layer naming.

use serde::Deserialize;

use mapdrift_common::{BBox, MapdriftError, Result};
use mapdrift_engine::{MatchRuleset, RulesetRegistry};

#[derive(Debug, Deserialize)]
struct RulesetFile {
    rulesets: Vec<RulesetEntry>,
}

#[derive(Debug, Deserialize)]
struct RulesetEntry {
    slug: String,
    dataset: String,
    #[serde(default = "default_layer")]
    layer: String,
    /// [min_x, min_y, max_x, max_y] in storage CRS meters.
    region: [f64; 4],
    threshold_m: f64,
    #[serde(default)]
    surface_unmatched_live: bool,
}

fn default_layer() -> String {
    "default".to_string()
}

/// Parse a ruleset file and validate every entry. A malformed entry fails
/// the whole load; a half-configured registry is worse than a loud start.
pub fn parse_rulesets(json: &str) -> Result<RulesetRegistry> {
    let file: RulesetFile = serde_json::from_str(json)
        .map_err(|e| MapdriftError::Config(format!("ruleset file: {e}")))?;

    let mut registry = RulesetRegistry::new();
    for entry in file.rulesets {
        let [min_x, min_y, max_x, max_y] = entry.region;
        let mut ruleset = MatchRuleset::new(
            &entry.slug,
            &entry.dataset,
            &entry.layer,
            BBox::new(min_x, min_y, max_x, max_y),
            entry.threshold_m,
        );
        if entry.surface_unmatched_live {
            ruleset = ruleset.surfacing_unmatched_live();
        }
        ruleset.validate()?;
        registry.insert(ruleset);
    }
    Ok(registry)
}

pub fn load_rulesets(path: &str) -> Result<RulesetRegistry> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| MapdriftError::Config(format!("reading {path}: {e}")))?;
    parse_rulesets(&json)
}
