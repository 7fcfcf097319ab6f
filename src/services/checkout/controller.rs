use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use super::return_params::{return_target, ReturnParams};
use super::session::{CheckoutSession, CheckoutState, Outcome};
use crate::cache::{SessionStorage, CONFIRMED_ORDER_KEY};
use crate::config::CheckoutConfig;
use crate::errors::{CheckoutError, OrderLoadFailure, ServiceError};
use crate::events::{CheckoutEvent, EventSender};
use crate::gateways::{OrderDataGateway, PaymentGateway};
use crate::metrics;
use crate::models::{
    ClientEnvironment, DeliveryMode, GatewayResult, Order, OrderId, OrderStatus, PaymentAttemptId,
    PaymentDispatch, PaymentRequest,
};

const CANCELLED_MESSAGE: &str = "Payment was cancelled. Returning to the home screen.";
const FAILED_MESSAGE: &str = "Payment could not be completed. Returning to the home screen.";
const SUCCEEDED_MESSAGE: &str = "Payment complete. Taking you to your order.";

/// Controller settings derived from [`CheckoutConfig`].
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub merchant_code: String,
    pub pg_provider: String,
    pub payment_method: String,
    pub return_url: Url,
    pub home_route: String,
    pub order_status_route: String,
    pub failure_redirect_delay: Duration,
    pub mobile_breakpoint_px: u32,
}

impl CheckoutSettings {
    pub fn from_config(config: &CheckoutConfig) -> Result<Self, ServiceError> {
        if config.merchant_code.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "payment gateway merchant code is not configured".to_string(),
            ));
        }
        Ok(Self {
            merchant_code: config.merchant_code.clone(),
            pg_provider: config.pg_provider.clone(),
            payment_method: config.payment_method.clone(),
            return_url: config.return_url()?,
            home_route: config.home_route.clone(),
            order_status_route: config.order_status_route.clone(),
            failure_redirect_delay: config.failure_redirect_delay(),
            mobile_breakpoint_px: config.mobile_breakpoint_px,
        })
    }
}

/// Where the view should go next, and after how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub path: String,
    pub delay: Duration,
}

/// Terminal result handed to the view: one message and one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conclusion {
    pub order_id: OrderId,
    pub outcome: Outcome,
    pub message: String,
    pub navigation: Navigation,
}

impl Conclusion {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// Result of a step that may leave the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStep {
    /// Navigate the browser to the gateway; the session stays alive only
    /// until the page unloads.
    Redirect { url: Url },
    Concluded(Conclusion),
}

/// What tearing the session down did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// No payable order was ever loaded.
    NothingToRelease,
    /// The session already reached success or failure.
    Settled,
    /// Control is with the gateway; the order is left alone.
    RedirectInFlight,
    /// The order was still pending and a cancellation was issued.
    CancellationIssued,
}

#[derive(Debug, Clone, Copy)]
enum FailureStage {
    Validation,
    Gateway,
    Verification,
}

impl FailureStage {
    fn label(self) -> &'static str {
        match self {
            FailureStage::Validation => "validation",
            FailureStage::Gateway => "gateway",
            FailureStage::Verification => "verification",
        }
    }
}

/// Owns one checkout session and drives it through order loading, payment,
/// verification and teardown.
///
/// Dropping the controller while the session is still pending and no redirect
/// is in flight cancels the order in the background; call
/// [`CheckoutController::on_session_teardown`] to do the same and wait for it.
pub struct CheckoutController {
    orders: Arc<dyn OrderDataGateway>,
    payments: Arc<dyn PaymentGateway>,
    storage: Arc<dyn SessionStorage>,
    events: Option<EventSender>,
    settings: CheckoutSettings,
    session: Option<CheckoutSession>,
    torn_down: bool,
}

impl fmt::Debug for CheckoutController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutController")
            .field("settings", &self.settings)
            .field("session", &self.session)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl CheckoutController {
    pub fn new(
        orders: Arc<dyn OrderDataGateway>,
        payments: Arc<dyn PaymentGateway>,
        storage: Arc<dyn SessionStorage>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            orders,
            payments,
            storage,
            events: None,
            settings,
            session: None,
            torn_down: false,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session(&self) -> Option<&CheckoutSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> CheckoutState {
        self.session
            .as_ref()
            .map(CheckoutSession::state)
            .unwrap_or(CheckoutState::Idle)
    }

    /// Whether the pay button should be enabled.
    pub fn can_request_payment(&self) -> bool {
        self.state() == CheckoutState::AwaitingPayment
    }

    /// Loads `order_id` and opens a session for it if it can still be paid.
    #[instrument(skip(self))]
    pub async fn begin_checkout(&mut self, order_id: OrderId) -> Result<Order, CheckoutError> {
        if let Some(session) = &self.session {
            return Err(CheckoutError::invalid_state("begin checkout", session.state()));
        }

        let order = self
            .orders
            .fetch_order(order_id)
            .await
            .map_err(|err| load_failure(order_id, err))?;

        if let Some(reason) = unpayable_reason(&order) {
            warn!(status = %order.status, ?reason, "order cannot be paid for");
            return Err(CheckoutError::OrderUnavailable {
                order_id,
                reason,
                message: load_failure_message(reason).to_string(),
            });
        }

        info!(total_amount = order.total_amount, "checkout started");
        metrics::CHECKOUT_SESSIONS_STARTED.inc();
        metrics::ACTIVE_CHECKOUT_SESSIONS.inc();

        let session = CheckoutSession::new(order.clone());
        self.emit(
            session.id(),
            CheckoutEvent::CheckoutStarted {
                order_id,
                total_amount: order.total_amount,
            },
        );
        self.session = Some(session);
        Ok(order)
    }

    /// Starts a payment attempt. Inline results are handled before this
    /// returns; redirect mode hands back the URL to navigate to.
    #[instrument(skip(self, environment))]
    pub async fn request_payment(
        &mut self,
        environment: &ClientEnvironment,
    ) -> Result<CheckoutStep, CheckoutError> {
        let mode = environment.delivery_mode(self.settings.mobile_breakpoint_px);

        let (session_id, order, attempt) = {
            let session = self.session_mut("request payment")?;
            let state = session.state();
            let order = match (state, session.order()) {
                (CheckoutState::AwaitingPayment, Some(order)) => order.clone(),
                _ => return Err(CheckoutError::invalid_state("request payment", state)),
            };
            let attempt = session.begin_attempt(mode);
            (session.id(), order, attempt)
        };
        let order_id = order.order_id;
        info!(%order_id, payment_attempt_id = %attempt, %mode, "payment requested");

        if let Err(err) = order.buyer.validate() {
            return Ok(CheckoutStep::Concluded(
                self.fail(FailureStage::Validation, err.to_string(), false)
                    .await,
            ));
        }

        if let Err(err) = self
            .orders
            .mark_status(order_id, OrderStatus::PaymentInProgress)
            .await
        {
            warn!(%order_id, error = %err, "could not mark order payment-in-progress; continuing");
        }

        metrics::record_payment_requested(mode);
        self.emit(
            session_id,
            CheckoutEvent::PaymentRequested {
                order_id,
                payment_attempt_id: attempt.clone(),
                mode,
            },
        );

        let request = self.payment_request(&order, attempt.clone(), mode);
        match self.payments.request_payment(&request).await {
            Ok(PaymentDispatch::Redirect { url }) => {
                if let Some(session) = self.session.as_mut() {
                    session.redirected();
                }
                info!(%order_id, redirect = %url, "handing control to payment gateway");
                self.emit(
                    session_id,
                    CheckoutEvent::PaymentRedirected {
                        order_id,
                        payment_attempt_id: attempt,
                    },
                );
                Ok(CheckoutStep::Redirect { url })
            }
            Ok(PaymentDispatch::Completed(result)) => self.handle_gateway_result(result).await,
            Err(err) => Ok(CheckoutStep::Concluded(
                self.fail(FailureStage::Gateway, err.to_string(), false)
                    .await,
            )),
        }
    }

    /// Interprets what the gateway reported, inline or via the return URL.
    #[instrument(skip(self, result), fields(error_code = ?result.error_code))]
    pub async fn handle_gateway_result(
        &mut self,
        result: GatewayResult,
    ) -> Result<CheckoutStep, CheckoutError> {
        let expected_attempt = {
            let session = self.session_mut("handle gateway result")?;
            match session.state() {
                CheckoutState::PaymentRequested | CheckoutState::RedirectedAway => {}
                other => return Err(CheckoutError::invalid_state("handle gateway result", other)),
            }
            session.returned();
            if let Some(reported) = &result.payment_attempt_id {
                session.adopt_attempt(reported);
            }
            session.payment_attempt_id().cloned()
        };

        if let (Some(expected), Some(reported)) = (&expected_attempt, &result.payment_attempt_id) {
            if expected != reported {
                let detail = format!("gateway reported attempt {} but {} is current", reported, expected);
                return Ok(CheckoutStep::Concluded(
                    self.fail(FailureStage::Gateway, detail, false).await,
                ));
            }
        }

        let gateway_payment_id = match result.tentative_payment_id() {
            Some(id) => id.to_string(),
            None => {
                let detail = result
                    .error_message
                    .clone()
                    .or_else(|| result.error_code.clone())
                    .unwrap_or_else(|| "gateway reported no payment".to_string());
                return Ok(CheckoutStep::Concluded(
                    self.fail(FailureStage::Gateway, detail, result.is_user_cancelled())
                        .await,
                ));
            }
        };

        let Some(attempt) = expected_attempt else {
            return Ok(CheckoutStep::Concluded(
                self.fail(
                    FailureStage::Gateway,
                    "payment result carried no attempt id".to_string(),
                    false,
                )
                .await,
            ));
        };

        if let Some(session) = self.session.as_mut() {
            session.verifying();
        }
        let conclusion = self.verify_with_backend(&attempt, &gateway_payment_id).await?;
        Ok(CheckoutStep::Concluded(conclusion))
    }

    /// Asks the backend to confirm the payment. Calling again with the same
    /// attempt after success returns the recorded result without side effects.
    #[instrument(skip(self))]
    pub async fn verify_with_backend(
        &mut self,
        payment_attempt_id: &PaymentAttemptId,
        gateway_payment_id: &str,
    ) -> Result<Conclusion, CheckoutError> {
        let order_id = {
            let session = self
                .session
                .as_ref()
                .ok_or_else(|| CheckoutError::invalid_state("verify payment", CheckoutState::Idle))?;
            match session.state() {
                CheckoutState::Verifying => {}
                CheckoutState::Succeeded
                    if session.payment_attempt_id() == Some(payment_attempt_id) =>
                {
                    debug!("payment already verified for this attempt");
                    return Ok(self.success_conclusion(session.order_id()));
                }
                other => return Err(CheckoutError::invalid_state("verify payment", other)),
            }
            if session.payment_attempt_id() != Some(payment_attempt_id) {
                None
            } else {
                Some(session.order_id())
            }
        };

        let Some(order_id) = order_id else {
            return Ok(self
                .fail(
                    FailureStage::Verification,
                    format!("attempt {} is not the current attempt", payment_attempt_id),
                    false,
                )
                .await);
        };

        match self
            .payments
            .verify_payment(payment_attempt_id, gateway_payment_id)
            .await
        {
            Ok(verification) if verification.confirmed && verification.order_id == order_id => {
                let session_id = self.settle_success(order_id).await;
                metrics::PAYMENTS_SUCCEEDED.inc();
                info!(%order_id, payment_attempt_id = %payment_attempt_id, "payment confirmed");
                self.emit(
                    session_id,
                    CheckoutEvent::PaymentVerified {
                        order_id,
                        payment_attempt_id: payment_attempt_id.clone(),
                    },
                );
                Ok(self.success_conclusion(order_id))
            }
            Ok(verification) => {
                let detail = verification.message.unwrap_or_else(|| {
                    format!(
                        "backend did not confirm payment for order {} (confirmed={}, order={})",
                        order_id, verification.confirmed, verification.order_id
                    )
                });
                Ok(self.fail(FailureStage::Verification, detail, false).await)
            }
            Err(err) => Ok(self
                .fail(FailureStage::Verification, err.to_string(), false)
                .await),
        }
    }

    /// Rebuilds a session from the return URL after a gateway redirect and
    /// handles the result found there.
    #[instrument(skip(self, params), fields(order_id = ?params.order_id()))]
    pub async fn resume_from_return(
        &mut self,
        params: &ReturnParams,
    ) -> Result<CheckoutStep, CheckoutError> {
        if let Some(session) = &self.session {
            return Err(CheckoutError::invalid_state("resume checkout", session.state()));
        }
        let order_id = params.order_id().ok_or_else(|| {
            CheckoutError::MissingReturnParams("neither order_id nor merchant_uid".to_string())
        })?;
        if !params.carries_gateway_result() {
            return Err(CheckoutError::MissingReturnParams(
                "no payment result on return url".to_string(),
            ));
        }

        let order = match self.orders.fetch_order(order_id).await {
            Ok(order) => Some(order),
            Err(err) => {
                warn!(%order_id, error = %err, "could not reload order after redirect; relying on verification");
                None
            }
        };

        let already_paid = order.as_ref().map_or(false, |order| order.status.is_paid());

        info!(%order_id, already_paid, "resuming checkout after gateway redirect");
        metrics::ACTIVE_CHECKOUT_SESSIONS.inc();
        self.session = Some(CheckoutSession::resumed(
            order_id,
            params.payment_attempt_id.clone(),
            order,
        ));

        // A reloaded return URL for a paid order must not be verified again:
        // the backend refuses the consumed payment id.
        if already_paid {
            self.settle_success(order_id).await;
            return Ok(CheckoutStep::Concluded(self.success_conclusion(order_id)));
        }
        self.handle_gateway_result(params.to_gateway_result()).await
    }

    /// Explicit teardown for when the checkout view goes away. Cancels the
    /// order if the session is still pending and no redirect is in flight.
    #[instrument(skip(self))]
    pub async fn on_session_teardown(mut self) -> Teardown {
        self.torn_down = true;

        let (session_id, order_id) = match self.session.as_mut() {
            None => return Teardown::NothingToRelease,
            Some(session) if session.outcome() != Outcome::Pending => return Teardown::Settled,
            Some(session) if session.redirect_in_flight() => {
                info!(order_id = %session.order_id(), "redirect in flight; leaving order untouched");
                return Teardown::RedirectInFlight;
            }
            Some(session) => {
                if let Err(err) = session.abandon() {
                    warn!(error = %err, "session settled concurrently with teardown");
                    return Teardown::Settled;
                }
                (session.id(), session.order_id())
            }
        };

        info!(%order_id, "checkout abandoned; cancelling order");
        metrics::ABANDONMENT_CANCELLATIONS.inc();
        self.emit(session_id, CheckoutEvent::SessionAbandoned { order_id });
        self.release_order(session_id, order_id, false).await;
        Teardown::CancellationIssued
    }

    fn session_mut(&mut self, operation: &'static str) -> Result<&mut CheckoutSession, CheckoutError> {
        self.session
            .as_mut()
            .ok_or_else(|| CheckoutError::invalid_state(operation, CheckoutState::Idle))
    }

    fn payment_request(
        &self,
        order: &Order,
        attempt: PaymentAttemptId,
        mode: DeliveryMode,
    ) -> PaymentRequest {
        PaymentRequest {
            merchant_code: self.settings.merchant_code.clone(),
            pg: self.settings.pg_provider.clone(),
            pay_method: self.settings.payment_method.clone(),
            merchant_uid: attempt,
            name: order.payment_title(),
            amount: order.total_amount,
            buyer_name: order.buyer.name.clone(),
            buyer_tel: order.buyer.phone.clone(),
            buyer_email: order.buyer.email.clone(),
            buyer_addr: order.buyer.address.clone(),
            m_redirect_url: return_target(&self.settings.return_url, order.order_id),
            mode,
        }
    }

    /// Settles the session as succeeded and hands the order id to the
    /// order-status view.
    async fn settle_success(&mut self, order_id: OrderId) -> Uuid {
        let session_id = match self.session.as_mut() {
            Some(session) => {
                if let Err(err) = session.succeed() {
                    warn!(%order_id, error = %err, "success reported for a settled session");
                }
                session.id()
            }
            None => Uuid::nil(),
        };

        if let Err(err) = self
            .storage
            .set(CONFIRMED_ORDER_KEY, &order_id.to_string(), None)
            .await
        {
            warn!(%order_id, error = %err, "could not store confirmed order id");
        }
        session_id
    }

    fn success_conclusion(&self, order_id: OrderId) -> Conclusion {
        Conclusion {
            order_id,
            outcome: Outcome::Succeeded,
            message: SUCCEEDED_MESSAGE.to_string(),
            navigation: Navigation {
                path: self.settings.order_status_route.clone(),
                delay: Duration::ZERO,
            },
        }
    }

    /// Moves the session to `Failed`, cancels and rejects the order, and
    /// builds the message for the view.
    async fn fail(&mut self, stage: FailureStage, detail: String, user_cancelled: bool) -> Conclusion {
        let (session_id, order_id, newly_failed) = match self.session.as_mut() {
            Some(session) => {
                let newly_failed = match session.fail() {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = %err, "failure reported for a settled session");
                        false
                    }
                };
                (session.id(), session.order_id(), newly_failed)
            }
            None => (Uuid::nil(), OrderId(0), false),
        };

        warn!(%order_id, stage = stage.label(), detail = %detail, user_cancelled, "checkout failed");
        metrics::record_payment_failed(stage.label());

        if newly_failed {
            self.emit(
                session_id,
                CheckoutEvent::PaymentFailed {
                    order_id,
                    reason: detail,
                },
            );
            self.release_order(session_id, order_id, true).await;
        }

        Conclusion {
            order_id,
            outcome: Outcome::AbandonedOrFailed,
            message: if user_cancelled {
                CANCELLED_MESSAGE
            } else {
                FAILED_MESSAGE
            }
            .to_string(),
            navigation: Navigation {
                path: self.settings.home_route.clone(),
                delay: self.settings.failure_redirect_delay,
            },
        }
    }

    /// Best-effort cancellation, plus a rejected mark for failed payments.
    /// Errors are logged and counted, never retried.
    async fn release_order(&self, session_id: Uuid, order_id: OrderId, reject: bool) {
        if let Err(err) = self.orders.cancel_order(order_id).await {
            self.cleanup_failed(session_id, order_id, "cancel", err);
        }
        if reject {
            if let Err(err) = self.orders.mark_status(order_id, OrderStatus::Rejected).await {
                self.cleanup_failed(session_id, order_id, "mark rejected", err);
            }
        }
    }

    fn cleanup_failed(&self, session_id: Uuid, order_id: OrderId, action: &str, err: ServiceError) {
        warn!(%order_id, action, code = err.code(), error = %err, "checkout cleanup call failed");
        metrics::CLEANUP_FAILURES.inc();
        self.emit(
            session_id,
            CheckoutEvent::CleanupFailed {
                order_id,
                error: err.to_string(),
            },
        );
    }

    /// Never waits on the receiver; a full or closed channel drops the event.
    fn emit(&self, session_id: Uuid, event: CheckoutEvent) {
        if let Some(events) = &self.events {
            if let Err(err) = events.try_send(session_id, event) {
                debug!(error = %err, "checkout event dropped");
            }
        }
    }
}

impl Drop for CheckoutController {
    fn drop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        metrics::ACTIVE_CHECKOUT_SESSIONS.dec();

        if self.torn_down || !session.needs_abandonment_cleanup() || session.abandon().is_err() {
            return;
        }

        let order_id = session.order_id();
        let session_id = session.id();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                info!(%order_id, "checkout dropped while pending; cancelling order");
                metrics::ABANDONMENT_CANCELLATIONS.inc();
                self.emit(session_id, CheckoutEvent::SessionAbandoned { order_id });
                let orders = Arc::clone(&self.orders);
                handle.spawn(async move {
                    if let Err(err) = orders.cancel_order(order_id).await {
                        warn!(%order_id, error = %err, "background order cancellation failed");
                        metrics::CLEANUP_FAILURES.inc();
                    }
                });
            }
            Err(_) => {
                warn!(%order_id, "checkout dropped outside an async runtime; order not cancelled");
            }
        }
    }
}

fn load_failure(order_id: OrderId, err: ServiceError) -> CheckoutError {
    let reason = match &err {
        ServiceError::NotFound(_) => OrderLoadFailure::NotFound,
        ServiceError::Unauthorized(_) | ServiceError::Forbidden(_) => OrderLoadFailure::Unauthorized,
        ServiceError::Conflict(_) => OrderLoadFailure::AlreadyPaid,
        _ => OrderLoadFailure::Unreachable,
    };
    warn!(%order_id, code = err.code(), error = %err, ?reason, "could not load order for checkout");
    CheckoutError::OrderUnavailable {
        order_id,
        reason,
        message: load_failure_message(reason).to_string(),
    }
}

fn unpayable_reason(order: &Order) -> Option<OrderLoadFailure> {
    if order.status.is_paid() {
        Some(OrderLoadFailure::AlreadyPaid)
    } else if !order.status.is_unpaid() || order.total_amount <= 0 {
        Some(OrderLoadFailure::NotPayable)
    } else {
        None
    }
}

fn load_failure_message(reason: OrderLoadFailure) -> &'static str {
    match reason {
        OrderLoadFailure::NotFound => "This order could not be found.",
        OrderLoadFailure::Unauthorized => "You do not have access to this order.",
        OrderLoadFailure::AlreadyPaid => "This order has already been paid.",
        OrderLoadFailure::NotPayable => "This order can no longer be paid for.",
        OrderLoadFailure::Unreachable => "We could not load your order. Please try again.",
    }
}
