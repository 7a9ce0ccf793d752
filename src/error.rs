//! Error taxonomy shared by the stores, the workflows and the HTTP layer
//!
//! Every workflow precondition has its own variant so that callers can branch
//! on the failure, and `IntoResponse` maps each of them to a status code and a
//! JSON body of the form `{"error": "...", "code": "..."}`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} not found")]
    TargetNotFound(String),

    #[error("Contact not found in contactedUsers")]
    ContactNotFound,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("You cannot contact your own listing")]
    SelfContact,

    #[error("You have already contacted this listing")]
    AlreadyContacted,

    #[error("You must contact the provider/owner and be confirmed first")]
    NotEligible,

    #[error("You have already rated this target")]
    DuplicateRating,

    #[error("Rating must be an integer between 1 and 5, got {0}")]
    InvalidRatingValue(i64),

    #[error("Invalid coordinate: latitude and longitude must both be finite numbers")]
    InvalidCoordinate,

    #[error("Document was modified concurrently, reload and retry")]
    Conflict,

    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Machine-readable error code returned alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::TargetNotFound(_) => "target_not_found",
            AppError::ContactNotFound => "contact_not_found",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Unauthorized => "forbidden",
            AppError::SelfContact => "self_contact",
            AppError::AlreadyContacted => "already_contacted",
            AppError::NotEligible => "not_eligible",
            AppError::DuplicateRating => "duplicate_rating",
            AppError::InvalidRatingValue(_) => "invalid_rating_value",
            AppError::InvalidCoordinate => "invalid_coordinate",
            AppError::Conflict => "conflict",
            AppError::Storage(_) => "storage",
            AppError::Serialization(_) => "serialization",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::AlreadyContacted
            | AppError::DuplicateRating
            | AppError::InvalidRatingValue(_)
            | AppError::InvalidCoordinate => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized | AppError::SelfContact | AppError::NotEligible => {
                StatusCode::FORBIDDEN
            }
            AppError::NotFound(_) | AppError::TargetNotFound(_) | AppError::ContactNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Storage(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "code": self.code(),
            })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

// redb splits its failures across several types; all of them fold into `redb::Error`.
macro_rules! storage_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AppError {
                fn from(err: $ty) -> Self {
                    AppError::Storage(err.into())
                }
            }
        )*
    };
}

storage_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
