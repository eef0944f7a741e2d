use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlagAtlasError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Data file error: {0}")]
    DataFile(String),

    #[error("SPARQL error: {0}")]
    Sparql(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl FlagAtlasError {
    pub fn not_found(kind: &str, key: impl ToString) -> Self {
        FlagAtlasError::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlagAtlasError>;
