use crate::apis::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tabular encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Storage error on {container}/{blob}: {message}")]
    Storage {
        container: String,
        blob: String,
        message: String,
    },

    #[error("Page {page} still failing after {attempts} attempts: {source}")]
    PageFetch {
        page: u32,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("Stage '{stage}' failed after {attempts} attempt(s): {reason}")]
    StageFailed {
        stage: String,
        attempts: u32,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, EtlError>;
