//! Collaborators of the checkout controller.
//!
//! Both traits describe services the controller consumes but does not own:
//! the order backend and the payment gateway. `backend` and `hosted_payment`
//! hold the HTTP implementations; tests substitute their own.

use async_trait::async_trait;
use url::Url;

use crate::errors::ServiceError;
use crate::models::{
    Order, OrderId, OrderStatus, PaymentAttemptId, PaymentDispatch, PaymentRequest,
    PaymentVerification,
};

pub mod backend;
pub mod hosted_payment;

pub use backend::BackendClient;
pub use hosted_payment::HostedPaymentGateway;

/// Order data owned by the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderDataGateway: Send + Sync {
    /// Current authoritative order, `NotFound` if it does not exist.
    async fn fetch_order(&self, order_id: OrderId) -> Result<Order, ServiceError>;

    /// Asks the backend to move the order to `status`. The backend may refuse.
    async fn mark_status(&self, order_id: OrderId, status: OrderStatus)
        -> Result<(), ServiceError>;

    /// Idempotent; a no-op on orders that are already cancelled or paid.
    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ServiceError>;
}

/// Third-party payment gateway plus the backend's verification endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentDispatch, ServiceError>;

    /// Authoritative confirmation of a gateway-reported payment against the
    /// order records.
    async fn verify_payment(
        &self,
        payment_attempt_id: &PaymentAttemptId,
        gateway_payment_id: &str,
    ) -> Result<PaymentVerification, ServiceError>;
}

/// Ensures `url` ends with `/` so relative joins append instead of replacing
/// the last path segment.
pub(crate) fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
