//! Crate-wide error type.
//!
//! A missing document is never an error here: lookups return `Option` and
//! mutations return `bool`. Everything that reaches [`Error`] is something the
//! caller has to deal with.

/// Errors surfaced by the store, repository, and embedding layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input: malformed dates, bad index or field names, wrong vector
    /// dimensionality, attempts to mutate immutable fields.
    #[error("validation error: {0}")]
    Validation(String),
    /// The backend could not be reached or rejected the request.
    #[error("backend unavailable: {0}")]
    Backend(String),
    /// The embedding provider failed, or produced nothing for non-empty input.
    #[error("embedding failure: {0}")]
    Embedding(String),
    /// Missing or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// `true` for caller mistakes, which the HTTP layer reports as 400.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
