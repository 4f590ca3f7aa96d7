use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

/// Error taxonomy for the scheduling core.
///
/// Only `Transaction` is safe to retry as-is: every operation that can
/// produce it is a single atomic unit, so a failed attempt leaves no
/// partial state. The other categories need corrected input or a re-fetch
/// from the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed date/time/id shape. Caller-fixable, no retry.
    #[error("{0}")]
    Validation(String),

    /// The targeted row is no longer in the expected state (slot already
    /// booked, leave already processed, duplicate leave date).
    #[error("{0}")]
    StateConflict(String),

    #[error("{0}")]
    NotFound(String),

    /// A business rule blocks the request (balance exhausted, monthly
    /// optional-leave reuse, too many activation ids).
    #[error("{0}")]
    PolicyViolation(String),

    /// Store error or transaction timeout. The whole operation aborted.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Transaction(e.to_string())
    }
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::StateConflict(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a unique-constraint violation to a StateConflict with the given
    /// message. Any other store error keeps the Transaction category.
    pub fn conflict_on_unique(e: sqlx::Error, message: impl Into<String>) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::StateConflict(message.into())
            }
            _ => CoreError::from(e),
        }
    }

    pub fn into_response_parts(self) -> (StatusCode, Json<Value>) {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            CoreError::Validation("bad date".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::StateConflict("slot taken".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::NotFound("no such child".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::PolicyViolation("balance exhausted".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CoreError::from(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[derive(Debug)]
    struct DuplicateKey;

    impl std::fmt::Display for DuplicateKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for DuplicateKey {}

    impl sqlx::error::DatabaseError for DuplicateKey {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn unique_violations_surface_as_state_conflicts() {
        let dup = sqlx::Error::Database(Box::new(DuplicateKey));
        assert!(matches!(
            CoreError::conflict_on_unique(dup, "already filed"),
            CoreError::StateConflict(_)
        ));
        assert!(matches!(
            CoreError::conflict_on_unique(sqlx::Error::PoolTimedOut, "already filed"),
            CoreError::Transaction(_)
        ));
    }
}
