use serde::Serialize;
use url::Url;

use crate::models::{GatewayResult, OrderId, PaymentAttemptId};

/// Query parameters found on the return URL after a gateway redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReturnParams {
    /// Set by us on the return target.
    pub order_id: Option<OrderId>,
    /// `merchant_uid`
    pub payment_attempt_id: Option<PaymentAttemptId>,
    /// `imp_uid`
    pub gateway_payment_id: Option<String>,
    /// `imp_success`, or `success` on some PG providers
    pub success: Option<bool>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl ReturnParams {
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())))
    }

    /// Parses a raw query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        )
    }

    fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> Self {
        let mut params = ReturnParams::default();
        for (key, value) in pairs {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "order_id" | "orderId" => params.order_id = value.parse().ok(),
                "merchant_uid" => params.payment_attempt_id = Some(value.into()),
                "imp_uid" => params.gateway_payment_id = Some(value),
                "imp_success" | "success" => params.success = parse_flag(&value),
                "error_code" => params.error_code = Some(value),
                "error_msg" => params.error_message = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Order this return belongs to: the explicit `order_id`, else the id
    /// embedded in the attempt token.
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id.or_else(|| {
            self.payment_attempt_id
                .as_ref()
                .and_then(PaymentAttemptId::order_id)
        })
    }

    /// Whether the gateway left any trace of a result on the URL.
    pub fn carries_gateway_result(&self) -> bool {
        self.payment_attempt_id.is_some()
            || self.gateway_payment_id.is_some()
            || self.success.is_some()
            || self.error_code.is_some()
    }

    pub fn to_gateway_result(&self) -> GatewayResult {
        GatewayResult {
            success: self.success,
            gateway_payment_id: self.gateway_payment_id.clone(),
            payment_attempt_id: self.payment_attempt_id.clone(),
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "y" | "yes" => Some(true),
        "false" | "0" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// Return target for a payment attempt: the configured return URL with our
/// order id appended. The gateway adds its own parameters on top.
pub fn return_target(return_url: &Url, order_id: OrderId) -> Url {
    let mut url = return_url.clone();
    url.query_pairs_mut()
        .append_pair("order_id", &order_id.to_string());
    url
}
