use thiserror::Error;

/// Failures that can escape the worker loop. Transport covers the
/// generation endpoint (discovery and image fetching degrade to empty
/// results instead of raising); Db covers storage.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Db(String),
}

impl AppError {
    pub fn db(e: impl std::fmt::Display) -> Self {
        AppError::Db(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
