pub mod config;
pub mod error;
pub mod geom;
pub mod tags;
pub mod types;

pub use config::Config;
pub use error::{MapdriftError, Result};
pub use geom::{BBox, Geometry, Point};
pub use tags::{tag_diff, tags, Tags};
pub use types::{
    apply_action, deviation_id, DatasetMeta, Deviation, DeviationAction, ElementType, FeatureRef,
    LiveFeature, MatchCandidate, UpstreamItem,
};
