use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{directory_url, OrderDataGateway};
use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use crate::models::order::StatusUpdate;
use crate::models::payment::VerifyPaymentRequest;
use crate::models::{Order, OrderId, OrderStatus, PaymentAttemptId, PaymentVerification};

/// REST client for the delivery backend's order and payment endpoints.
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl BackendClient {
    pub fn new(
        base_url: Url,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = directory_url(base_url);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    pub fn from_config(config: &CheckoutConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.api_base_url)?;
        Self::new(
            base_url,
            config.auth_token.clone(),
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> Result<Url, ServiceError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "backend request failed");
        Err(ServiceError::from_status(status, body))
    }

    /// `POST /api/payments/verify`
    #[instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        payment_attempt_id: &PaymentAttemptId,
        gateway_payment_id: &str,
    ) -> Result<PaymentVerification, ServiceError> {
        let body = VerifyPaymentRequest {
            merchant_uid: payment_attempt_id.clone(),
            imp_uid: gateway_payment_id.to_string(),
        };
        let response = self
            .authorize(self.client.post(self.url("api/payments/verify")?))
            .json(&body)
            .send()
            .await?;
        let verification: PaymentVerification = Self::check(response).await?.json().await?;
        debug!(confirmed = verification.confirmed, order_id = %verification.order_id, "payment verification received");
        Ok(verification)
    }
}

#[async_trait]
impl OrderDataGateway for BackendClient {
    #[instrument(skip(self))]
    async fn fetch_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let response = self
            .authorize(self.client.get(self.url(&format!("api/orders/{}", order_id))?))
            .send()
            .await?;
        let order = Self::check(response).await?.json().await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn mark_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let response = self
            .authorize(
                self.client
                    .patch(self.url(&format!("api/orders/{}/status", order_id))?),
            )
            .json(&StatusUpdate { status })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ServiceError> {
        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("api/orders/{}/cancel", order_id))?),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
