use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapdriftError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tile encoding error: {0}")]
    Tile(String),

    #[error("Refresh already in progress for ruleset {0}")]
    RefreshInProgress(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MapdriftError>;
