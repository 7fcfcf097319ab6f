use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{DeliveryMode, OrderId, PaymentAttemptId};

/// Progress notifications a view can render without polling the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    CheckoutStarted {
        order_id: OrderId,
        total_amount: i64,
    },
    PaymentRequested {
        order_id: OrderId,
        payment_attempt_id: PaymentAttemptId,
        mode: DeliveryMode,
    },
    PaymentRedirected {
        order_id: OrderId,
        payment_attempt_id: PaymentAttemptId,
    },
    PaymentVerified {
        order_id: OrderId,
        payment_attempt_id: PaymentAttemptId,
    },
    PaymentFailed {
        order_id: OrderId,
        reason: String,
    },
    SessionAbandoned {
        order_id: OrderId,
    },
    CleanupFailed {
        order_id: OrderId,
        error: String,
    },
}

/// An event stamped with the session that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: CheckoutEvent,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<EventRecord>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<EventRecord>) -> Self {
        Self { sender }
    }

    /// Sender plus the receiving end, for callers that own both.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, session_id: Uuid, event: CheckoutEvent) -> Result<(), String> {
        let record = EventRecord {
            session_id,
            occurred_at: Utc::now(),
            event,
        };
        self.sender
            .send(record)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Non-blocking variant. Fails instead of waiting when the channel is full.
    pub fn try_send(&self, session_id: Uuid, event: CheckoutEvent) -> Result<(), String> {
        let record = EventRecord {
            session_id,
            occurred_at: Utc::now(),
            event,
        };
        self.sender
            .try_send(record)
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
