use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Live feature database API (read-only lookups)
    pub osm_api_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Snapshot refresh cadence for the background loop
    pub refresh_minutes: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            osm_api_url: env::var("OSM_API_URL")
                .unwrap_or_else(|_| "https://api.openstreetmap.org".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            refresh_minutes: env::var("CACHE_REFRESH_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("CACHE_REFRESH_MINUTES must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
