use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    response::{ApiResponse, Meta},
    status::OrderStatus,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found")]
    NotFound,

    #[error("Perfume with id {0} not found")]
    PerfumeNotFound(Uuid),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Not enough stock for perfume {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment processor unavailable: {0}")]
    PaymentProcessorUnavailable(String),

    #[error("Payment processor timed out")]
    PaymentProcessorTimeout,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::PerfumeNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::InvalidStatus(_)
            | AppError::InsufficientStock { .. }
            | AppError::MissingSignature
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentProcessorUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::PaymentProcessorTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Constraint violations become client errors; everything else stays internal.
impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                return AppError::Conflict("A unique constraint would be violated".into());
            }
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                return AppError::Conflict("Record is still referenced by other records".into());
            }
            _ => {}
        }
        match err {
            DbErr::RecordNotFound(_) => AppError::NotFound,
            other => AppError::OrmError(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let message = self.to_string();
        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData { error: message }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (AppError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::PerfumeNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidStatus("x".into()), StatusCode::BAD_REQUEST),
            (
                AppError::InsufficientStock { product_id: Uuid::nil() },
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::InvalidTransition {
                    from: OrderStatus::Completed,
                    to: OrderStatus::Pending,
                },
                StatusCode::CONFLICT,
            ),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::MissingSignature, StatusCode::BAD_REQUEST),
            (AppError::InvalidSignature, StatusCode::BAD_REQUEST),
            (
                AppError::PaymentProcessorUnavailable("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::PaymentProcessorTimeout, StatusCode::GATEWAY_TIMEOUT),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let err: AppError = DbErr::RecordNotFound("orders".into()).into();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AppError::Internal(anyhow::anyhow!("password=hunter2"));
        assert_eq!(err.to_string(), "Internal Server Error");
        let err: AppError = DbErr::Custom("relation does not exist".into()).into();
        assert_eq!(err.to_string(), "ORM error");
    }
}
