use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

use super::order::OrderId;

/// Gateway error code reported when the buyer closes the payment window.
pub const USER_CANCELLED: &str = "USER_CANCELLED";

/// Client-generated token naming one payment attempt (the gateway's
/// `merchant_uid`). Distinct from anything the gateway or backend assigns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentAttemptId(String);

impl PaymentAttemptId {
    /// Fresh attempt id for `order_id`, shaped `order_{id}_{nonce}` so the
    /// order can be recovered from it after a redirect.
    pub fn generate(order_id: OrderId) -> Self {
        PaymentAttemptId(format!("order_{}_{}", order_id, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Order id embedded by [`PaymentAttemptId::generate`], if present.
    pub fn order_id(&self) -> Option<OrderId> {
        let rest = self.0.strip_prefix("order_")?;
        let (id, _nonce) = rest.split_once('_')?;
        id.parse().ok()
    }
}

impl From<String> for PaymentAttemptId {
    fn from(value: String) -> Self {
        PaymentAttemptId(value)
    }
}

impl From<&str> for PaymentAttemptId {
    fn from(value: &str) -> Self {
        PaymentAttemptId(value.to_string())
    }
}

impl fmt::Display for PaymentAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the gateway hands its result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryMode {
    /// Result arrives in-page (desktop payment dialog).
    Inline,
    /// Full-page navigation to the gateway, result arrives on the return URL.
    Redirect,
}

/// What the embedding client knows about the device it runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvironment {
    pub viewport_width: Option<u32>,
    pub user_agent: Option<String>,
}

impl ClientEnvironment {
    pub fn desktop() -> Self {
        Self {
            viewport_width: Some(1280),
            user_agent: None,
        }
    }

    pub fn mobile() -> Self {
        Self {
            viewport_width: Some(390),
            user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile".into()),
        }
    }

    /// Picks the delivery mode once; callers store the result instead of
    /// re-inspecting the environment.
    pub fn delivery_mode(&self, mobile_breakpoint_px: u32) -> DeliveryMode {
        let narrow = self
            .viewport_width
            .map(|width| width < mobile_breakpoint_px)
            .unwrap_or(false);
        let mobile_agent = self
            .user_agent
            .as_deref()
            .map(|ua| {
                let ua = ua.to_ascii_lowercase();
                ua.contains("mobile") || ua.contains("android") || ua.contains("iphone")
            })
            .unwrap_or(false);

        if narrow || mobile_agent {
            DeliveryMode::Redirect
        } else {
            DeliveryMode::Inline
        }
    }
}

/// Payload sent to the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub merchant_code: String,
    pub pg: String,
    pub pay_method: String,
    pub merchant_uid: PaymentAttemptId,
    pub name: String,
    pub amount: i64,
    pub buyer_name: String,
    pub buyer_tel: String,
    pub buyer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_addr: Option<String>,
    /// Where the gateway sends the browser back in redirect mode.
    pub m_redirect_url: Url,
    pub mode: DeliveryMode,
}

/// Outcome reported by the gateway, either inline or via return parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResult {
    #[serde(default)]
    pub success: Option<bool>,
    /// Gateway-assigned payment id (`imp_uid`).
    #[serde(default, rename = "imp_uid")]
    pub gateway_payment_id: Option<String>,
    #[serde(default, rename = "merchant_uid")]
    pub payment_attempt_id: Option<PaymentAttemptId>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default, rename = "error_msg")]
    pub error_message: Option<String>,
}

impl GatewayResult {
    pub fn succeeded(attempt: PaymentAttemptId, gateway_payment_id: impl Into<String>) -> Self {
        Self {
            success: Some(true),
            gateway_payment_id: Some(gateway_payment_id.into()),
            payment_attempt_id: Some(attempt),
            ..Default::default()
        }
    }

    pub fn failed(attempt: Option<PaymentAttemptId>, code: &str, message: &str) -> Self {
        Self {
            success: Some(false),
            payment_attempt_id: attempt,
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Gateway payment id if the result is a tentative success.
    ///
    /// An explicit failure flag or any error code wins over a present id.
    pub fn tentative_payment_id(&self) -> Option<&str> {
        if self.success == Some(false) || self.error_code.is_some() {
            return None;
        }
        self.gateway_payment_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn is_user_cancelled(&self) -> bool {
        self.error_code.as_deref() == Some(USER_CANCELLED)
    }
}

/// What the gateway did with a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDispatch {
    /// The result is already known (inline mode).
    Completed(GatewayResult),
    /// The browser must navigate to `url`; the result comes back on the
    /// return URL.
    Redirect { url: Url },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub merchant_uid: PaymentAttemptId,
    pub imp_uid: String,
}

/// Backend's authoritative answer about a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub confirmed: bool,
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
