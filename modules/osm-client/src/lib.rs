//! Read-only client for the live feature database's public API.
//!
//! The engine never owns this data: it fetches the current tags, version,
//! last-update timestamp, and editor username of a matched feature for
//! display beside a deviation.

pub mod error;

pub use error::{OsmError, Result};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mapdrift_common::{ElementType, FeatureRef, Tags};

/// Current state of one live feature, as the live database reports it.
#[derive(Debug, Clone, Serialize)]
pub struct LiveFeatureInfo {
    pub feature: FeatureRef,
    pub tags: Tags,
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElementsResponse {
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    id: i64,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    version: u64,
    timestamp: Option<DateTime<Utc>>,
    user: Option<String>,
}

pub struct OsmClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsmClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the current version of a feature via the `/api/0.6` JSON
    /// endpoint.
    pub async fn feature(&self, element: ElementType, id: i64) -> Result<LiveFeatureInfo> {
        let endpoint = format!("{}/api/0.6/{}/{}.json", self.base_url, element, id);

        let resp = self.client.get(&endpoint).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(OsmError::NotFound(format!("{element}/{id}")));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OsmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ElementsResponse = resp.json().await?;
        let el = body
            .elements
            .into_iter()
            .next()
            .ok_or_else(|| OsmError::NotFound(format!("{element}/{id}")))?;

        Ok(LiveFeatureInfo {
            feature: FeatureRef { element, id: el.id },
            tags: el.tags,
            version: el.version,
            updated_at: el.timestamp,
            user: el.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_response_parses_osm_json() {
        let json = r#"{
            "elements": [{
                "type": "node",
                "id": 4211528331,
                "lat": 59.3, "lon": 18.1,
                "timestamp": "2021-05-04T18:06:55Z",
                "version": 3,
                "user": "mapper",
                "tags": {"emergency": "fire_hydrant"}
            }]
        }"#;
        let parsed: ElementsResponse = serde_json::from_str(json).unwrap();
        let el = &parsed.elements[0];
        assert_eq!(el.id, 4211528331);
        assert_eq!(el.version, 3);
        assert_eq!(el.user.as_deref(), Some("mapper"));
        assert_eq!(el.tags.get("emergency").map(String::as_str), Some("fire_hydrant"));
    }

    #[test]
    fn missing_tags_default_to_empty() {
        let json = r#"{"elements": [{"id": 1, "version": 1, "timestamp": null, "user": null}]}"#;
        let parsed: ElementsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.elements[0].tags.is_empty());
    }
}
