use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Backend-assigned order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        OrderId(id)
    }
}

impl std::str::FromStr for OrderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(OrderId)
    }
}

/// Order status as reported by the backend. The client never moves an order
/// between these on its own; it only asks the backend to.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created by the customer, not yet paid.
    Created,
    PaymentInProgress,
    Paid,
    Rejected,
    Cancelled,
    /// Store owner accepted the order.
    Accepted,
    Cooking,
    Delivering,
    Delivered,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether a payment may still be started for an order in this status.
    ///
    /// `PaymentInProgress` counts as unpaid: an earlier attempt that never
    /// returned from the gateway leaves the order there.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::PaymentInProgress)
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::Accepted
                | OrderStatus::Cooking
                | OrderStatus::Delivering
                | OrderStatus::Delivered
        )
    }
}

/// Buyer contact details, passed through to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BuyerInfo {
    #[validate(length(min = 1, message = "buyer name is required"))]
    pub name: String,
    #[validate(length(min = 9, max = 20, message = "buyer phone looks invalid"))]
    pub phone: String,
    #[validate(email(message = "buyer email looks invalid"))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Local, possibly stale copy of a backend order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    /// Whole currency units.
    pub total_amount: i64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    pub buyer: BuyerInfo,
}

impl Order {
    /// Display name used for the gateway's product line.
    pub fn payment_title(&self) -> String {
        match &self.store_name {
            Some(store) => format!("{} order #{}", store, self.order_id),
            None => format!("Order #{}", self.order_id),
        }
    }
}

/// Body of a status change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}
