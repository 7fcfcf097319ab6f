//! HTTP contract tests for the backend and hosted gateway clients.

use std::time::Duration;

use assert_matches::assert_matches;
use food_checkout::{
    errors::ServiceError,
    gateways::{BackendClient, HostedPaymentGateway, OrderDataGateway, PaymentGateway},
    models::{
        ClientEnvironment, DeliveryMode, OrderId, OrderStatus, PaymentAttemptId, PaymentDispatch,
        PaymentRequest,
    },
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, token: Option<&str>) -> BackendClient {
    BackendClient::new(
        Url::parse(&server.uri()).unwrap(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn order_json(status: &str) -> serde_json::Value {
    json!({
        "orderId": 42,
        "totalAmount": 15000,
        "status": status,
        "storeName": "Bibimbap Corner",
        "buyer": {
            "name": "Kim Minji",
            "phone": "01012345678",
            "email": "minji@example.com",
            "address": null
        }
    })
}

fn payment_request(return_url: &str) -> PaymentRequest {
    PaymentRequest {
        merchant_code: "imp00000000".into(),
        pg: "html5_inicis".into(),
        pay_method: "card".into(),
        merchant_uid: PaymentAttemptId::from("order_42_abc"),
        name: "Bibimbap Corner".into(),
        amount: 15000,
        buyer_name: "Kim Minji".into(),
        buyer_tel: "01012345678".into(),
        buyer_email: "minji@example.com".into(),
        buyer_addr: None,
        m_redirect_url: Url::parse(return_url).unwrap(),
        mode: ClientEnvironment::desktop().delivery_mode(768),
    }
}

#[tokio::test]
async fn fetch_order_sends_bearer_token_and_parses_camel_case() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/42"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("CREATED")))
        .expect(1)
        .mount(&server)
        .await;

    let order = backend(&server, Some("token-123"))
        .fetch_order(OrderId(42))
        .await
        .unwrap();

    assert_eq!(order.order_id, OrderId(42));
    assert_eq!(order.total_amount, 15000);
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.store_name.as_deref(), Some("Bibimbap Corner"));
}

#[tokio::test]
async fn unknown_status_values_do_not_break_parsing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("REFUND_PENDING")))
        .mount(&server)
        .await;

    let order = backend(&server, None).fetch_order(OrderId(42)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Unknown);
}

#[tokio::test]
async fn error_statuses_map_to_service_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such order"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/401"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/orders/500/cancel"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = backend(&server, None);
    assert_matches!(
        client.fetch_order(OrderId(404)).await,
        Err(ServiceError::NotFound(body)) if body == "no such order"
    );
    assert_matches!(
        client.fetch_order(OrderId(401)).await,
        Err(ServiceError::Unauthorized(_))
    );
    assert_matches!(
        client.cancel_order(OrderId(500)).await,
        Err(ServiceError::ExternalServiceError(_))
    );
}

#[tokio::test]
async fn mark_status_patches_with_screaming_snake_status() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/orders/42/status"))
        .and(body_json(json!({ "status": "PAYMENT_IN_PROGRESS" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/orders/42/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = backend(&server, None);
    client
        .mark_status(OrderId(42), OrderStatus::PaymentInProgress)
        .await
        .unwrap();
    client.cancel_order(OrderId(42)).await.unwrap();
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/api/orders/42/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(
        Url::parse(&format!("{}/v2", server.uri())).unwrap(),
        None,
        Duration::from_secs(5),
    )
    .unwrap();
    client.cancel_order(OrderId(42)).await.unwrap();
}

#[tokio::test]
async fn verification_goes_to_backend() {
    let backend_server = MockServer::start().await;
    let gateway_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/payments/verify"))
        .and(body_json(json!({ "merchant_uid": "order_42_abc", "imp_uid": "PG-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "confirmed": true,
            "orderId": 42
        })))
        .expect(1)
        .mount(&backend_server)
        .await;

    let gateway = HostedPaymentGateway::new(
        Url::parse(&gateway_server.uri()).unwrap(),
        backend(&backend_server, None),
        Duration::from_secs(5),
    )
    .unwrap();
    let verification = gateway
        .verify_payment(&PaymentAttemptId::from("order_42_abc"), "PG-1")
        .await
        .unwrap();

    assert!(verification.confirmed);
    assert_eq!(verification.order_id, OrderId(42));
    assert_eq!(verification.message, None);
}

#[tokio::test]
async fn gateway_returns_inline_result_or_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "success": true,
                "imp_uid": "PG-1",
                "merchant_uid": "order_42_abc"
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payments/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "redirect_url": "https://pay.example.com/m/checkout/abc"
        })))
        .mount(&server)
        .await;

    let gateway = HostedPaymentGateway::new(
        Url::parse(&server.uri()).unwrap(),
        backend(&server, None),
        Duration::from_secs(5),
    )
    .unwrap();
    let request = payment_request("http://localhost:3000/user/payment?order_id=42");
    assert_eq!(request.mode, DeliveryMode::Inline);

    let inline = gateway.request_payment(&request).await.unwrap();
    let PaymentDispatch::Completed(result) = inline else {
        panic!("expected an inline result, got {:?}", inline);
    };
    assert_eq!(result.tentative_payment_id(), Some("PG-1"));

    let redirect = gateway.request_payment(&request).await.unwrap();
    assert_matches!(
        redirect,
        PaymentDispatch::Redirect { url } if url.path() == "/m/checkout/abc"
    );
}

#[tokio::test]
async fn gateway_rejection_and_empty_answers_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/request"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payments/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let gateway = HostedPaymentGateway::new(
        Url::parse(&server.uri()).unwrap(),
        backend(&server, None),
        Duration::from_secs(5),
    )
    .unwrap();
    let request = payment_request("http://localhost:3000/user/payment");

    assert_matches!(
        gateway.request_payment(&request).await,
        Err(ServiceError::PaymentFailed(message)) if message.contains("upstream down")
    );
    assert_matches!(
        gateway.request_payment(&request).await,
        Err(ServiceError::ParseError(_))
    );
}
