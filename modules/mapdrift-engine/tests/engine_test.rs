//! End-to-end engine behavior over the in-memory store: refresh, the three
//! classification outcomes, action carry-forward, and per-ruleset refresh
//! isolation.

use std::collections::BTreeSet;
use std::sync::Arc;

use mapdrift_common::{
    tags, BBox, DatasetMeta, DeviationAction, ElementType, FeatureRef, Geometry, LiveFeature,
    MapdriftError, Point, Tags, UpstreamItem,
};
use mapdrift_engine::{Engine, MatchKind, MatchRuleset, RulesetRegistry};
use mapdrift_store::memory::MemoryStore;

fn meta(slug: &str) -> DatasetMeta {
    DatasetMeta {
        slug: slug.to_string(),
        name: format!("{slug} registry"),
        provider: "City of Testville".to_string(),
        source_url: "https://data.example.com".to_string(),
        license: "CC0".to_string(),
        fetched_at: None,
    }
}

fn item(id: &str, x: f64, y: f64, item_tags: Tags) -> UpstreamItem {
    UpstreamItem {
        ids: BTreeSet::from([id.to_string()]),
        geometry: Some(Geometry::Point(Point::new(x, y))),
        tags: item_tags,
    }
}

fn feature(id: i64, x: f64, y: f64, feat_tags: Tags) -> LiveFeature {
    LiveFeature {
        feature: FeatureRef {
            element: ElementType::Node,
            id,
        },
        tags: feat_tags,
        geometry: Some(Geometry::Point(Point::new(x, y))),
    }
}

fn region() -> BBox {
    BBox::new(0.0, 0.0, 10_000.0, 10_000.0)
}

fn engine(store: Arc<MemoryStore>, rulesets: Vec<MatchRuleset>) -> Engine {
    let mut registry = RulesetRegistry::new();
    for rs in rulesets {
        registry.insert(rs);
    }
    Engine::new(store.clone(), store, registry)
}

#[tokio::test]
async fn item_with_no_nearby_feature_becomes_missing_deviation() {
    // Scenario A: upstream point with no live feature within 50 m.
    let p = Geometry::Point(Point::new(500.0, 500.0));
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![feature(1, 600.0, 500.0, Tags::new())]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    let stats = engine.refresh("signs").await.unwrap();
    assert_eq!(stats.missing, 1);

    let snap = engine.snapshots().get("signs").unwrap();
    assert_eq!(snap.deviations.len(), 1);
    let d = &snap.deviations[0];
    assert_eq!(d.title, "missing");
    assert!(d.matched.is_none());
    assert_eq!(d.suggested_geom, Some(p));
    assert!(d.suggested_tags.is_none());
}

#[tokio::test]
async fn matched_feature_with_differing_tags_becomes_tag_mismatch() {
    // Scenario B: {information: sign} against an untagged feature.
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![feature(1, 510.0, 500.0, Tags::new())]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    let stats = engine.refresh("signs").await.unwrap();
    assert_eq!(stats.tag_mismatch, 1);

    let snap = engine.snapshots().get("signs").unwrap();
    let d = &snap.deviations[0];
    assert_eq!(d.title, "tag mismatch");
    assert_eq!(d.suggested_tags, Some(tags([("information", "sign")])));
    assert!(d.suggested_geom.is_none());
    assert_eq!(d.matched.map(|f| f.id), Some(1));
}

#[tokio::test]
async fn matched_feature_with_identical_tags_is_silent() {
    // Scenario C: identical derived tags, no deviation materialized.
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![feature(1, 510.0, 500.0, tags([("information", "sign")]))]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    let stats = engine.refresh("signs").await.unwrap();
    assert_eq!(stats.unchanged, 1);

    let snap = engine.snapshots().get("signs").unwrap();
    assert!(snap.deviations.is_empty());
    // The match still renders on the tile layer.
    assert_eq!(snap.states.len(), 1);
    assert_eq!(snap.states[0].kind, MatchKind::InBoth);
}

#[tokio::test]
async fn action_survives_two_refreshes() {
    // Scenario D: a fixed action persists across an unchanged reclassification.
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    engine.refresh("signs").await.unwrap();
    let id = engine.snapshots().get("signs").unwrap().deviations[0].id;

    let updated = engine.set_action(id, DeviationAction::Fixed).await.unwrap();
    assert_eq!(updated.action, Some(DeviationAction::Fixed));
    let at = updated.action_at.unwrap();

    engine.refresh("signs").await.unwrap();
    engine.refresh("signs").await.unwrap();

    let snap = engine.snapshots().get("signs").unwrap();
    let d = snap.deviation(id).unwrap();
    assert_eq!(d.action, Some(DeviationAction::Fixed));
    assert_eq!(d.action_at, Some(at));
}

#[tokio::test]
async fn action_is_discarded_when_item_stops_deviating() {
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![feature(1, 510.0, 500.0, Tags::new())]),
    );
    let engine = engine(
        store.clone(),
        vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)],
    );

    engine.refresh("signs").await.unwrap();
    let id = engine.snapshots().get("signs").unwrap().deviations[0].id;
    engine.set_action(id, DeviationAction::Fixed).await.unwrap();

    // A mapper fixes the tags: the item now classifies clean and the
    // recorded action goes with the deviation.
    store.set_features(vec![feature(1, 510.0, 500.0, tags([("information", "sign")]))]);
    let stats = engine.refresh("signs").await.unwrap();
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.actions_discarded, 1);
    assert!(engine.snapshots().get("signs").unwrap().deviations.is_empty());

    // The tags regress: the new deviation starts without the old decision.
    store.set_features(vec![feature(1, 510.0, 500.0, Tags::new())]);
    engine.refresh("signs").await.unwrap();
    let snap = engine.snapshots().get("signs").unwrap();
    let d = snap.deviation(id).unwrap();
    assert!(d.action.is_none());
    assert!(d.action_at.is_none());
}

#[tokio::test]
async fn at_most_one_deviation_per_upstream_item() {
    // Two features within threshold: selector picks one, classifier emits one.
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![
                feature(10, 510.0, 500.0, Tags::new()),
                feature(11, 520.0, 500.0, Tags::new()),
            ]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    engine.refresh("signs").await.unwrap();
    let snap = engine.snapshots().get("signs").unwrap();
    assert_eq!(snap.deviations.len(), 1);
    // Nearer feature selected.
    assert_eq!(snap.deviations[0].matched.map(|f| f.id), Some(10));
}

#[tokio::test]
async fn equidistant_features_select_lowest_id() {
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![
                feature(42, 510.0, 500.0, Tags::new()),
                feature(7, 490.0, 500.0, Tags::new()),
            ]),
    );
    let engine = engine(store, vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)]);

    for _ in 0..5 {
        engine.refresh("signs").await.unwrap();
        let snap = engine.snapshots().get("signs").unwrap();
        assert_eq!(snap.deviations[0].matched.map(|f| f.id), Some(7));
    }
}

#[tokio::test]
async fn invalid_ruleset_refresh_leaves_other_snapshots_alone() {
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![]),
    );
    let good = MatchRuleset::new("signs", "signs", "default", region(), 50.0);
    // Inverted bbox: fatal configuration error for this ruleset only.
    let bad = MatchRuleset::new("broken", "signs", "default", BBox::new(10.0, 0.0, 0.0, 10.0), 50.0);
    let engine = engine(store, vec![good, bad]);

    engine.refresh("signs").await.unwrap();
    let before = engine.snapshots().get("signs").unwrap().version;

    assert!(matches!(
        engine.refresh("broken").await,
        Err(MapdriftError::Config(_))
    ));
    assert!(engine.snapshots().get("broken").is_none());
    assert_eq!(engine.snapshots().get("signs").unwrap().version, before);
}

#[tokio::test]
async fn unknown_ruleset_and_unknown_deviation_are_not_found() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store, vec![]);

    assert!(matches!(
        engine.refresh("nope").await,
        Err(MapdriftError::NotFound(_))
    ));
    assert!(matches!(
        engine.set_action(uuid::Uuid::new_v4(), DeviationAction::Deferred).await,
        Err(MapdriftError::NotFound(_))
    ));
}

#[tokio::test]
async fn unmatched_live_features_surface_when_opted_in() {
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![
                feature(1, 510.0, 500.0, tags([("information", "sign")])),
                feature(2, 3000.0, 3000.0, tags([("information", "board")])),
            ]),
    );
    let engine = engine(
        store,
        vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0).surfacing_unmatched_live()],
    );

    engine.refresh("signs").await.unwrap();
    let snap = engine.snapshots().get("signs").unwrap();
    let unmatched: Vec<_> = snap
        .states
        .iter()
        .filter(|s| s.kind == MatchKind::NotInUpstream)
        .collect();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].feature.map(|f| f.id), Some(2));
}

#[tokio::test]
async fn persisted_actions_survive_an_engine_restart() {
    let store = Arc::new(
        MemoryStore::new()
            .with_dataset(meta("signs"), vec![item("s-1", 500.0, 500.0, tags([("information", "sign")]))])
            .with_features(vec![]),
    );

    let first = engine(
        store.clone(),
        vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)],
    );
    first.refresh("signs").await.unwrap();
    let id = first.snapshots().get("signs").unwrap().deviations[0].id;
    first.set_action(id, DeviationAction::NotAnIssue).await.unwrap();

    // Fresh engine over the same backing store.
    let second = engine(
        store,
        vec![MatchRuleset::new("signs", "signs", "default", region(), 50.0)],
    );
    second.refresh("signs").await.unwrap();
    let snap = second.snapshots().get("signs").unwrap();
    assert_eq!(snap.deviation(id).unwrap().action, Some(DeviationAction::NotAnIssue));
}
