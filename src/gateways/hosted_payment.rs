use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use super::{directory_url, BackendClient, PaymentGateway};
use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use crate::models::{
    GatewayResult, PaymentAttemptId, PaymentDispatch, PaymentRequest, PaymentVerification,
};

/// Hosted payment API: either settles the payment in-page or hands back a URL
/// the browser must navigate to. Verification goes to the delivery backend,
/// never to the gateway.
#[derive(Clone, Debug)]
pub struct HostedPaymentGateway {
    client: reqwest::Client,
    request_url: Url,
    backend: BackendClient,
}

#[derive(Debug, Deserialize)]
struct HostedPaymentResponse {
    #[serde(default)]
    redirect_url: Option<Url>,
    #[serde(default)]
    result: Option<GatewayResult>,
}

impl HostedPaymentGateway {
    pub fn new(
        gateway_url: Url,
        backend: BackendClient,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let request_url = directory_url(gateway_url).join("payments/request")?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            request_url,
            backend,
        })
    }

    pub fn from_config(config: &CheckoutConfig, backend: BackendClient) -> Result<Self, ServiceError> {
        let gateway_url = Url::parse(&config.payment_gateway_url)?;
        Self::new(
            gateway_url,
            backend,
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl PaymentGateway for HostedPaymentGateway {
    #[instrument(skip(self, request), fields(merchant_uid = %request.merchant_uid, mode = %request.mode))]
    async fn request_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentDispatch, ServiceError> {
        let response = self
            .client
            .post(self.request_url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "payment gateway rejected request");
            return Err(ServiceError::PaymentFailed(format!(
                "gateway error {}: {}",
                status, body
            )));
        }

        let parsed: HostedPaymentResponse = response.json().await?;
        match (parsed.redirect_url, parsed.result) {
            (Some(url), _) => {
                info!(redirect = %url, "gateway requested redirect");
                Ok(PaymentDispatch::Redirect { url })
            }
            (None, Some(result)) => Ok(PaymentDispatch::Completed(result)),
            (None, None) => Err(ServiceError::ParseError(
                "gateway response carried neither a result nor a redirect".to_string(),
            )),
        }
    }

    async fn verify_payment(
        &self,
        payment_attempt_id: &PaymentAttemptId,
        gateway_payment_id: &str,
    ) -> Result<PaymentVerification, ServiceError> {
        self.backend
            .verify_payment(payment_attempt_id, gateway_payment_id)
            .await
    }
}
