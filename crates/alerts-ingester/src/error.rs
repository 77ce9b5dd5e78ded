use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("fetching feed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    FeedStatus(reqwest::StatusCode),

    #[error("decoding protobuf feed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("reading feed file: {0}")]
    FeedFile(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("running migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Core(#[from] alerts_core::CoreError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
