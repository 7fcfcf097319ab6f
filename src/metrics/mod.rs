use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use tracing::trace;

use crate::models::DeliveryMode;

lazy_static! {
    pub static ref CHECKOUT_SESSIONS_STARTED: IntCounter = register_int_counter!(
        "checkout_sessions_started_total",
        "Checkouts opened on a payable order; sessions resumed after a redirect are not counted again"
    ).expect("checkout_sessions_started_total registers once");

    pub static ref ACTIVE_CHECKOUT_SESSIONS: IntGauge = register_int_gauge!(
        "active_checkout_sessions",
        "Checkout sessions currently alive in this process, including ones resumed after a redirect"
    ).expect("active_checkout_sessions registers once");

    pub static ref PAYMENTS_REQUESTED: IntCounterVec = register_int_counter_vec!(
        "checkout_payments_requested_total",
        "Payment attempts handed to the gateway, by delivery mode",
        &["mode"]
    ).expect("checkout_payments_requested_total registers once");

    pub static ref PAYMENTS_SUCCEEDED: IntCounter = register_int_counter!(
        "checkout_payments_succeeded_total",
        "Payments confirmed by the backend"
    ).expect("checkout_payments_succeeded_total registers once");

    pub static ref PAYMENTS_FAILED: IntCounterVec = register_int_counter_vec!(
        "checkout_payments_failed_total",
        "Checkout sessions that ended in failure, by stage",
        &["stage"]
    ).expect("checkout_payments_failed_total registers once");

    pub static ref ABANDONMENT_CANCELLATIONS: IntCounter = register_int_counter!(
        "checkout_abandonment_cancellations_total",
        "Orders cancelled because their checkout was torn down while pending"
    ).expect("checkout_abandonment_cancellations_total registers once");

    pub static ref CLEANUP_FAILURES: IntCounter = register_int_counter!(
        "checkout_cleanup_failures_total",
        "Best-effort cleanup calls that failed"
    ).expect("checkout_cleanup_failures_total registers once");
}

pub fn record_payment_requested(mode: DeliveryMode) {
    PAYMENTS_REQUESTED
        .with_label_values(&[mode.to_string().as_str()])
        .inc();
    trace!(%mode, "recorded payment request");
}

pub fn record_payment_failed(stage: &str) {
    PAYMENTS_FAILED.with_label_values(&[stage]).inc();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_export() {
        record_payment_requested(DeliveryMode::Redirect);
        record_payment_failed("gateway");
        let text = gather_metrics().unwrap();
        assert!(text.contains("checkout_payments_requested_total"));
        assert!(text.contains("mode=\"redirect\""));
        assert!(text.contains("stage=\"gateway\""));
    }

    #[test]
    fn session_help_text_states_how_resumed_sessions_count() {
        lazy_static::initialize(&CHECKOUT_SESSIONS_STARTED);
        lazy_static::initialize(&ACTIVE_CHECKOUT_SESSIONS);
        let text = gather_metrics().unwrap();
        assert!(text.contains(
            "# HELP checkout_sessions_started_total Checkouts opened on a payable order; sessions resumed after a redirect are not counted again"
        ));
        assert!(text.contains(
            "# HELP active_checkout_sessions Checkout sessions currently alive in this process, including ones resumed after a redirect"
        ));
    }
}
