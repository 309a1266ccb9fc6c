//! Error types shared by the store, the services and the HTTP layer

use thiserror::Error;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Domain error surfaced to callers.
///
/// `NotFound`, `Forbidden` and `BadRequest` carry a human-readable message
/// that is safe to return to clients. `Internal` and `Db` are reported generically.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        AppError::Db(DbError::Query(e))
    }
}

impl AppError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} {} not found", what, id))
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Internal(_) | AppError::Db(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) | AppError::Db(_) => "internal",
        }
    }

    /// Message safe to show to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Db(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("Pet", 3).status_code(), 404);
        assert_eq!(AppError::Forbidden("no".into()).status_code(), 403);
        assert_eq!(AppError::BadRequest("bad".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized("who".into()).status_code(), 401);
        let db: AppError = diesel::result::Error::NotFound.into();
        assert_eq!(db.status_code(), 500);
        assert_eq!(db.code(), "internal");
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err: AppError = DbError::Connection("secret path /var/db".into()).into();
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(AppError::not_found("Pet", 7).public_message(), "Pet 7 not found");
    }
}
