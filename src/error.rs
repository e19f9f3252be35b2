use thiserror::Error;
use uuid::Uuid;

use crate::domain::EntityKind;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error during {operation} of {entity} {id}: {source}")]
    Storage {
        operation: &'static str,
        entity: EntityKind,
        id: String,
        #[source]
        source: RepositoryError,
    },
}

impl PaymentError {
    /// Wraps a repository failure with what was being done to which entity.
    pub fn storage(
        operation: &'static str,
        entity: EntityKind,
        id: impl ToString,
    ) -> impl FnOnce(RepositoryError) -> PaymentError {
        let id = id.to_string();
        move |source| PaymentError::Storage {
            operation,
            entity,
            id,
            source,
        }
    }

    /// HTTP-equivalent status for callers that surface these errors over the wire.
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Validation(_) => 400,
            PaymentError::NotFound { .. } => 404,
            PaymentError::Precondition(_) => 412,
            PaymentError::Conflict(_) => 409,
            PaymentError::Storage { .. } => 500,
        }
    }
}
