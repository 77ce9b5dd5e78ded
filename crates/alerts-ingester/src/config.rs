use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// DSN for the static GTFS timetable database (agencies/routes/stops/trips/calendar).
    pub gtfs_dsn: String,
    /// DSN for the alerts database the ingester writes normalized alerts into.
    pub alerts_dsn: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// GTFS-RT service alerts endpoint to poll when no `--file` override is given.
    pub mot_endpoint: String,
    /// Hard timeout for the feed fetch, in seconds.
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_feed_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
