use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error taxonomy for the record store.
///
/// `Validation` and `CascadeConflict` reject the mutation before anything is
/// applied; `NotFound` covers missing get/delete targets; the persistence
/// variants are only fatal for an explicit `persist()` call — mutations that
/// fail to flush keep serving from memory and flag the store degraded.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("cascade conflict: {0}")]
    CascadeConflict(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::CascadeConflict(message.into())
    }
}
