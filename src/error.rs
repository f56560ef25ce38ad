// Error taxonomy shared by the store, the reconciler and the HTTP layer

use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BingoError {
    /// Malformed input. Nothing was persisted.
    #[error("{}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("{0}")]
    NotFound(String),

    /// Owner name did not match on a protected operation.
    #[error("{0}")]
    Forbidden(String),

    /// The generated card code already exists. Creation may be retried.
    #[error("card code {0} already exists, please retry")]
    DuplicateCode(String),

    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T, E = BingoError> = std::result::Result<T, E>;

impl BingoError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        BingoError::Validation(vec![ValidationError::new(field, message)])
    }

    pub fn card_not_found(code: &str) -> Self {
        BingoError::NotFound(format!("card {} not found", code))
    }

    pub fn goal_not_found(id: i64) -> Self {
        BingoError::NotFound(format!("goal {} not found", id))
    }

    /// True for failures of the underlying store rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BingoError::Store(_) | BingoError::Serialization(_) | BingoError::Internal(_)
        )
    }
}

impl From<Vec<ValidationError>> for BingoError {
    fn from(errors: Vec<ValidationError>) -> Self {
        BingoError::Validation(errors)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
