use thiserror::Error;

#[derive(Error, Debug)]
pub enum OsmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Feature not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, OsmError>;
