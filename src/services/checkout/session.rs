use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DeliveryMode, Order, OrderId, PaymentAttemptId};

/// Where a checkout session is in its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    AwaitingPayment,
    PaymentRequested,
    RedirectedAway,
    Verifying,
    Succeeded,
    Failed,
}

/// Settlement of a session. Leaves `Pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Pending,
    Succeeded,
    AbandonedOrFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("checkout outcome already settled as {0}")]
pub struct AlreadySettled(pub Outcome);

/// In-memory record of one attempt to pay for one order.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    id: Uuid,
    order_id: OrderId,
    order: Option<Order>,
    state: CheckoutState,
    outcome: Outcome,
    payment_attempt_id: Option<PaymentAttemptId>,
    delivery_mode: Option<DeliveryMode>,
    redirect_in_flight: bool,
}

impl CheckoutSession {
    /// Session for a freshly loaded, payable order.
    pub fn new(order: Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.order_id,
            order: Some(order),
            state: CheckoutState::AwaitingPayment,
            outcome: Outcome::Pending,
            payment_attempt_id: None,
            delivery_mode: None,
            redirect_in_flight: false,
        }
    }

    /// Session rebuilt from return parameters after a full-page redirect.
    /// Control is still with the gateway until its result is handled.
    pub fn resumed(
        order_id: OrderId,
        payment_attempt_id: Option<PaymentAttemptId>,
        order: Option<Order>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            order,
            state: CheckoutState::RedirectedAway,
            outcome: Outcome::Pending,
            payment_attempt_id,
            delivery_mode: Some(DeliveryMode::Redirect),
            redirect_in_flight: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn payment_attempt_id(&self) -> Option<&PaymentAttemptId> {
        self.payment_attempt_id.as_ref()
    }

    pub fn delivery_mode(&self) -> Option<DeliveryMode> {
        self.delivery_mode
    }

    pub fn redirect_in_flight(&self) -> bool {
        self.redirect_in_flight
    }

    /// Starts a new payment attempt with a fresh attempt id.
    pub(crate) fn begin_attempt(&mut self, mode: DeliveryMode) -> PaymentAttemptId {
        let attempt = PaymentAttemptId::generate(self.order_id);
        self.payment_attempt_id = Some(attempt.clone());
        self.delivery_mode = Some(mode);
        self.state = CheckoutState::PaymentRequested;
        attempt
    }

    /// Takes the attempt id reported on a return URL when the session was
    /// rebuilt without one.
    pub(crate) fn adopt_attempt(&mut self, attempt: &PaymentAttemptId) {
        if self.payment_attempt_id.is_none() {
            self.payment_attempt_id = Some(attempt.clone());
        }
    }

    pub(crate) fn redirected(&mut self) {
        self.redirect_in_flight = true;
        self.delivery_mode = Some(DeliveryMode::Redirect);
        self.state = CheckoutState::RedirectedAway;
    }

    /// Control is back from the gateway, whatever it reported.
    pub(crate) fn returned(&mut self) {
        self.redirect_in_flight = false;
    }

    pub(crate) fn verifying(&mut self) {
        self.redirect_in_flight = false;
        self.state = CheckoutState::Verifying;
    }

    /// Backend confirmed the payment, or the order was already paid.
    pub(crate) fn succeed(&mut self) -> Result<(), AlreadySettled> {
        self.settle(Outcome::Succeeded)?;
        self.redirect_in_flight = false;
        self.state = CheckoutState::Succeeded;
        Ok(())
    }

    pub(crate) fn fail(&mut self) -> Result<(), AlreadySettled> {
        self.settle(Outcome::AbandonedOrFailed)?;
        self.redirect_in_flight = false;
        self.state = CheckoutState::Failed;
        Ok(())
    }

    /// Settles as abandoned without entering a terminal view state.
    pub(crate) fn abandon(&mut self) -> Result<(), AlreadySettled> {
        self.settle(Outcome::AbandonedOrFailed)
    }

    fn settle(&mut self, outcome: Outcome) -> Result<(), AlreadySettled> {
        if self.outcome != Outcome::Pending {
            return Err(AlreadySettled(self.outcome));
        }
        self.outcome = outcome;
        Ok(())
    }

    /// Whether tearing the session down now must cancel the order: still
    /// pending and not waiting on a redirect.
    pub fn needs_abandonment_cleanup(&self) -> bool {
        self.outcome == Outcome::Pending && !self.redirect_in_flight
    }
}
