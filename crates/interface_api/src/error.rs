//! API error handling
//!
//! Every failure leaves as `{"success": false, "error": <kind>, "message", "details"?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_billing::{BillingError, BillingErrorKind};

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// HTTP status and machine-readable kind
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Billing(err) => {
                let status = match err.kind() {
                    BillingErrorKind::NotFound => StatusCode::NOT_FOUND,
                    BillingErrorKind::AlreadyPaid | BillingErrorKind::PaymentExceedsDue => {
                        StatusCode::BAD_REQUEST
                    }
                    BillingErrorKind::InvalidInvoiceData
                    | BillingErrorKind::InvalidPaymentData
                    | BillingErrorKind::InvalidPriceData => StatusCode::UNPROCESSABLE_ENTITY,
                    BillingErrorKind::PricingNotConfigured
                    | BillingErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind().as_str())
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();

        let (message, details) = match self {
            ApiError::Billing(BillingError::PersistenceFailure(detail)) => {
                error!(detail = %detail, "persistence failure");
                ("The operation could not be completed".to_string(), None)
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                ("Internal server error".to_string(), None)
            }
            ApiError::Validation { message, details } => {
                (message, (!details.is_empty()).then_some(details))
            }
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            success: false,
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingRole(_) => ApiError::Forbidden(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter()
                    .map(move |e| format!("{}: {}", field, e.code))
            })
            .collect();
        if let Some(validator::ValidationErrorsKind::List(list)) = errors.errors().get("items") {
            for (index, nested) in list {
                for (field, errs) in nested.field_errors() {
                    for e in errs {
                        details.push(format!("items[{}].{}: {}", index, field, e.code));
                    }
                }
            }
        }
        details.sort();
        ApiError::Validation {
            message: "Request validation failed".to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: BillingError) -> (StatusCode, &'static str) {
        ApiError::from(err).status_and_kind()
    }

    #[test]
    fn test_billing_error_statuses() {
        assert_eq!(
            status_of(BillingError::not_found("Appointment", 7)),
            (StatusCode::NOT_FOUND, "not_found")
        );
        assert_eq!(
            status_of(BillingError::already_paid("Appointment", 7)),
            (StatusCode::BAD_REQUEST, "already_paid")
        );
        assert_eq!(
            status_of(BillingError::InvalidPaymentData("amount".into())),
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_payment_data")
        );
        assert_eq!(
            status_of(BillingError::PersistenceFailure("pool closed".into())),
            (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure")
        );
    }

    #[test]
    fn test_missing_role_is_forbidden() {
        let err = ApiError::from(AuthError::MissingRole("cashier".into()));
        assert_eq!(err.status_and_kind().0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let err = ApiError::from(AuthError::TokenExpired);
        assert_eq!(err.status_and_kind().0, StatusCode::UNAUTHORIZED);
    }
}
