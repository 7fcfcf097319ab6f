#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use food_checkout::{
    cache::InMemorySessionStorage,
    config::CheckoutConfig,
    errors::ServiceError,
    events::{EventRecord, EventSender},
    gateways::{OrderDataGateway, PaymentGateway},
    models::{
        BuyerInfo, GatewayResult, Order, OrderId, OrderStatus, PaymentAttemptId, PaymentDispatch,
        PaymentRequest, PaymentVerification,
    },
    services::checkout::{CheckoutController, CheckoutSettings},
};
use tokio::sync::mpsc;
use url::Url;

/// Calls the controller made against the order backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Fetch(OrderId),
    Mark(OrderId, OrderStatus),
    Cancel(OrderId),
}

/// In-memory order backend that records every call.
#[derive(Default)]
pub struct RecordingBackend {
    orders: Mutex<HashMap<OrderId, Order>>,
    calls: Mutex<Vec<BackendCall>>,
    fail_marks: Mutex<bool>,
    fail_cancels: Mutex<bool>,
}

impl RecordingBackend {
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let backend = Self::default();
        {
            let mut store = backend.orders.lock().unwrap();
            for order in orders {
                store.insert(order.order_id, order);
            }
        }
        backend
    }

    pub fn fail_marks(&self) {
        *self.fail_marks.lock().unwrap() = true;
    }

    pub fn fail_cancels(&self) {
        *self.fail_cancels.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancel_count(&self, order_id: OrderId) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == BackendCall::Cancel(order_id))
            .count()
    }

    pub fn mark_count(&self, order_id: OrderId, status: OrderStatus) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == BackendCall::Mark(order_id, status))
            .count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl OrderDataGateway for RecordingBackend {
    async fn fetch_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.record(BackendCall::Fetch(order_id));
        self.orders
            .lock()
            .unwrap()
            .get(&order_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
    }

    async fn mark_status(&self, order_id: OrderId, status: OrderStatus) -> Result<(), ServiceError> {
        self.record(BackendCall::Mark(order_id, status));
        if *self.fail_marks.lock().unwrap() {
            return Err(ServiceError::ServiceUnavailable("backend down".into()));
        }
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            order.status = status;
        }
        Ok(())
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), ServiceError> {
        self.record(BackendCall::Cancel(order_id));
        if *self.fail_cancels.lock().unwrap() {
            return Err(ServiceError::ServiceUnavailable("backend down".into()));
        }
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            if order.status.is_unpaid() {
                order.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }
}

type DispatchFn = dyn Fn(&PaymentRequest) -> Result<PaymentDispatch, ServiceError> + Send + Sync;
type VerifyFn =
    dyn Fn(&PaymentAttemptId, &str) -> Result<PaymentVerification, ServiceError> + Send + Sync;

/// Payment gateway whose answers are scripted per test.
pub struct ScriptedGateway {
    dispatch: Box<DispatchFn>,
    verify: Box<VerifyFn>,
    requests: Mutex<Vec<PaymentRequest>>,
    verifications: Mutex<Vec<(PaymentAttemptId, String)>>,
}

impl ScriptedGateway {
    pub fn new(
        dispatch: impl Fn(&PaymentRequest) -> Result<PaymentDispatch, ServiceError>
            + Send
            + Sync
            + 'static,
        verify: impl Fn(&PaymentAttemptId, &str) -> Result<PaymentVerification, ServiceError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            dispatch: Box::new(dispatch),
            verify: Box::new(verify),
            requests: Mutex::new(Vec::new()),
            verifications: Mutex::new(Vec::new()),
        }
    }

    /// Inline success with `gateway_payment_id`, confirmed by the backend.
    pub fn approving(gateway_payment_id: &'static str) -> Self {
        Self::new(
            move |request| {
                Ok(PaymentDispatch::Completed(GatewayResult::succeeded(
                    request.merchant_uid.clone(),
                    gateway_payment_id,
                )))
            },
            |attempt, _| {
                Ok(PaymentVerification {
                    confirmed: true,
                    order_id: attempt.order_id().unwrap_or(OrderId(0)),
                    message: None,
                })
            },
        )
    }

    /// Inline result reporting that the user closed the payment dialog.
    pub fn user_cancelling() -> Self {
        Self::new(
            |request| {
                Ok(PaymentDispatch::Completed(GatewayResult::failed(
                    Some(request.merchant_uid.clone()),
                    "USER_CANCELLED",
                    "user closed the payment window",
                )))
            },
            |_, _| Err(ServiceError::InvalidOperation("unexpected verification".into())),
        )
    }

    /// Redirect flow; verification confirms the attempt's own order.
    pub fn redirecting() -> Self {
        Self::new(
            |request| {
                let mut url = Url::parse("https://pay.example.com/checkout").unwrap();
                url.query_pairs_mut()
                    .append_pair("merchant_uid", request.merchant_uid.as_str());
                Ok(PaymentDispatch::Redirect { url })
            },
            |attempt, _| {
                Ok(PaymentVerification {
                    confirmed: true,
                    order_id: attempt.order_id().unwrap_or(OrderId(0)),
                    message: None,
                })
            },
        )
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn verifications(&self) -> Vec<(PaymentAttemptId, String)> {
        self.verifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn request_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentDispatch, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.dispatch)(request)
    }

    async fn verify_payment(
        &self,
        payment_attempt_id: &PaymentAttemptId,
        gateway_payment_id: &str,
    ) -> Result<PaymentVerification, ServiceError> {
        self.verifications
            .lock()
            .unwrap()
            .push((payment_attempt_id.clone(), gateway_payment_id.to_string()));
        (self.verify)(payment_attempt_id, gateway_payment_id)
    }
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Kim Minji".into(),
        phone: "01012345678".into(),
        email: "minji@example.com".into(),
        address: Some("12 Teheran-ro, Seoul".into()),
    }
}

pub fn order(id: i64, total_amount: i64, status: OrderStatus) -> Order {
    Order {
        order_id: OrderId(id),
        total_amount,
        status,
        store_name: Some("Bibimbap Corner".into()),
        buyer: buyer(),
    }
}

pub fn settings() -> CheckoutSettings {
    CheckoutSettings::from_config(&CheckoutConfig::default()).expect("default settings")
}

/// Shared collaborators for one test; build as many controllers as needed.
pub struct Harness {
    pub backend: Arc<RecordingBackend>,
    pub gateway: Arc<ScriptedGateway>,
    pub storage: Arc<InMemorySessionStorage>,
    events: EventSender,
    event_rx: Mutex<mpsc::Receiver<EventRecord>>,
}

impl Harness {
    pub fn new(backend: RecordingBackend, gateway: ScriptedGateway) -> Self {
        let (events, event_rx) = EventSender::channel(256);
        Self {
            backend: Arc::new(backend),
            gateway: Arc::new(gateway),
            storage: Arc::new(InMemorySessionStorage::new()),
            events,
            event_rx: Mutex::new(event_rx),
        }
    }

    pub fn controller(&self) -> CheckoutController {
        CheckoutController::new(
            self.backend.clone(),
            self.gateway.clone(),
            self.storage.clone(),
            settings(),
        )
        .with_events(self.events.clone())
    }

    /// Events emitted so far, oldest first.
    pub fn drain_events(&self) -> Vec<EventRecord> {
        let mut rx = self.event_rx.lock().unwrap();
        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        records
    }
}
