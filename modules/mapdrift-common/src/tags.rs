use std::collections::BTreeMap;

/// Attribute mapping on an upstream item or live feature. Ordered so that
/// serialized forms (tile attributes, JSONB columns) are stable.
pub type Tags = BTreeMap<String, String>;

/// Build a `Tags` from string pairs. Convenience for rulesets and tests.
pub fn tags<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Structural diff between upstream-derived tags and live tags.
///
/// Returns the entries of `upstream` whose key is missing from `live` or
/// mapped to a different value. Keys present only in `live` are not
/// reported: the upstream registry is authoritative for the keys it
/// defines and says nothing about keys it does not.
pub fn tag_diff(upstream: &Tags, live: &Tags) -> Tags {
    upstream
        .iter()
        .filter(|&(k, v)| live.get(k) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
