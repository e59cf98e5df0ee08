//! The conflation engine: spatial candidate matching, deterministic
//! best-match selection, tag-difference classification, and atomically
//! published result snapshots.

pub mod classifier;
pub mod matcher;
pub mod refresh;
pub mod ruleset;
pub mod selector;
pub mod snapshot;

pub use classifier::{classify, Classified};
pub use matcher::match_candidates;
pub use refresh::{Engine, RefreshStats};
pub use ruleset::{
    DistanceScorer, IdentityTags, MatchRuleset, RulesetRegistry, Scorer, TagDeriver,
};
pub use selector::select_best;
pub use snapshot::{MatchKind, MatchState, Snapshot, SnapshotStore};
