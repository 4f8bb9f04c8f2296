use sea_orm::error::DbErr;
use sea_orm::SqlErr;
use serde::Serialize;
use uuid::Uuid;

use crate::tree::TreeError;

/// Coarse error classification exposed to collaborators (REST layer, import
/// pipeline) so they can branch without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification of {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        id: Uuid,
        expected: i32,
        actual: i32,
    },

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<TreeError> for ServiceError {
    fn from(err: TreeError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Maps a write failure, turning unique-constraint violations into conflicts.
    pub fn from_write(error: DbErr) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                ServiceError::Conflict(format!("unique constraint violated: {}", detail))
            }
            _ => ServiceError::DatabaseError(error),
        }
    }

    /// The error kind callers should react to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::ConcurrentModification { .. } => ErrorKind::Conflict,
            Self::DatabaseError(_) | Self::StorageError(_) => ErrorKind::Storage,
        }
    }

    /// Returns the error message suitable for external callers.
    /// Storage failures return generic messages to avoid leaking driver details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn category_not_found(id: Uuid) -> Self {
        ServiceError::NotFound(format!("Category {} not found", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_kind_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::ConcurrentModification {
                id: Uuid::nil(),
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::StorageError("timeout".into()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn response_message_hides_driver_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("relation \"categories\" does not exist".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Category missing".into()).response_message(),
            "Not found: Category missing"
        );
    }

    #[test]
    fn tree_errors_become_validation_errors() {
        let err: ServiceError = TreeError::TargetInsideSubtree {
            target: 3,
            left: 2,
            right: 5,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn error_kind_displays_snake_case() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
