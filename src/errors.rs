use serde::Serialize;
use thiserror::Error;

use crate::models::order::OrderId;
use crate::services::checkout::session::CheckoutState;

/// Failures reported by the order backend or the payment gateway.
///
/// These never reach the view layer directly: the checkout controller folds
/// them into a terminal state plus a user-facing message.
#[derive(Debug, Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::ParseError(err.to_string())
        } else if err.is_timeout() || err.is_connect() {
            ServiceError::ServiceUnavailable(err.to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::InvalidInput(format!("invalid url: {}", err))
    }
}

impl ServiceError {
    /// Maps a non-success HTTP status from a collaborator to an error variant.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 | 422 => ServiceError::InvalidInput(body),
            401 => ServiceError::Unauthorized(body),
            402 => ServiceError::PaymentFailed(body),
            403 => ServiceError::Forbidden(body),
            404 => ServiceError::NotFound(body),
            409 => ServiceError::Conflict(body),
            503 => ServiceError::ServiceUnavailable(body),
            _ => ServiceError::ExternalServiceError(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Short machine-readable code, used in logs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidOperation(_) => "invalid_operation",
            ServiceError::PaymentFailed(_) => "payment_failed",
            ServiceError::ExternalServiceError(_) => "external_error",
            ServiceError::ParseError(_) => "parse_error",
            ServiceError::ServiceUnavailable(_) => "unavailable",
        }
    }
}

/// Why an order could not be opened for checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLoadFailure {
    NotFound,
    Unauthorized,
    AlreadyPaid,
    NotPayable,
    Unreachable,
}

/// Errors returned across the checkout controller boundary.
#[derive(Debug, Error, Serialize)]
pub enum CheckoutError {
    /// Terminal: the order cannot be paid for. Nothing was started, so
    /// nothing is cleaned up.
    #[error("{message}")]
    OrderUnavailable {
        order_id: OrderId,
        reason: OrderLoadFailure,
        message: String,
    },

    /// The operation is not allowed in the session's current state, e.g. a
    /// second payment request while the first one is in flight.
    #[error("cannot {operation} while checkout is {state}")]
    InvalidState {
        operation: &'static str,
        state: CheckoutState,
    },

    #[error("return url does not identify an order: {0}")]
    MissingReturnParams(String),
}

impl CheckoutError {
    pub fn invalid_state(operation: &'static str, state: CheckoutState) -> Self {
        CheckoutError::InvalidState { operation, state }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::OrderUnavailable { message, .. } => message.clone(),
            CheckoutError::InvalidState { .. } => {
                "A payment is already in progress for this order.".to_string()
            }
            CheckoutError::MissingReturnParams(_) => {
                "We could not find the order for this payment.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(404, "not_found")]
    #[case(401, "unauthorized")]
    #[case(403, "forbidden")]
    #[case(409, "conflict")]
    #[case(402, "payment_failed")]
    #[case(500, "external_error")]
    fn status_codes_map_to_variants(#[case] status: u16, #[case] code: &str) {
        let status = reqwest::StatusCode::from_u16(status).unwrap();
        let err = ServiceError::from_status(status, "body".to_string());
        assert_eq!(err.code(), code);
    }

    #[test]
    fn invalid_state_has_user_message() {
        let err = CheckoutError::invalid_state("request payment", CheckoutState::PaymentRequested);
        assert_eq!(
            err.to_string(),
            "cannot request payment while checkout is payment_requested"
        );
        assert!(err.user_message().contains("already in progress"));
    }
}
