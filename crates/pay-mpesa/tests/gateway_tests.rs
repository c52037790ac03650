//! Daraja client tests against a mock gateway.

use pay_core::{
    CallbackOutcome, Decimal, InMemoryLedger, PaymentError, PaymentLedger, PaymentRequest,
    PaymentStatus, PushPaymentStrategy,
};
use pay_mpesa::{MpesaConfig, MpesaStrategy, TokenProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/oauth/v1/generate";
const STK_PATH: &str = "/mpesa/stkpush/v1/processrequest";

fn config(server: &MockServer) -> MpesaConfig {
    MpesaConfig::new(
        "key",
        "secret",
        "174379",
        "passkey",
        "https://pay.example.com",
    )
    .with_api_base_url(server.uri())
    .with_token_retry(3, Duration::from_millis(10))
}

fn token_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "tok-123",
        "expires_in": "3599"
    }))
}

fn stk_ok(checkout_request_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    }))
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .and(query_param("grant_type", "client_credentials"))
        .and(header("Authorization", "Basic a2V5OnNlY3JldA=="))
        .respond_with(token_ok())
        .mount(server)
        .await;
}

fn success_callback(checkout_request_id: &str, amount: i64, receipt: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": amount },
                        { "Name": "MpesaReceiptNumber", "Value": receipt },
                        { "Name": "TransactionDate", "Value": 20251014101500u64 },
                        { "Name": "PhoneNumber", "Value": 254712345678u64 }
                    ]
                }
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_initiate_then_callback_completes() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .and(header("Authorization", "Bearer tok-123"))
        .and(body_partial_json(json!({
            "BusinessShortCode": "174379",
            "TransactionType": "CustomerPayBillOnline",
            "Amount": 75,
            "PartyA": "254712345678",
            "PartyB": "174379",
            "PhoneNumber": "254712345678",
            "CallBackURL": "https://pay.example.com/webhook/mpesa",
            "AccountReference": "FLIER-1"
        })))
        .respond_with(stk_ok("ws_CO_A"))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();

    let request = PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier payment");
    let handle = strategy.initiate(&request).await.unwrap();

    assert_eq!(handle.correlation_id, "ws_CO_A");
    assert_eq!(handle.status, PaymentStatus::Pending);
    assert_eq!(ledger.len().await, 1);

    let record = ledger.find_by_correlation("ws_CO_A").await.unwrap().unwrap();
    assert_eq!(record.id, handle.record_id);
    assert_eq!(record.status, PaymentStatus::Pending);
    assert_eq!(record.phone, "254712345678");

    let outcome = strategy
        .reconcile(&success_callback("ws_CO_A", 75, "ABC123"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Settled {
            correlation_id: "ws_CO_A".into(),
            status: PaymentStatus::Completed
        }
    );

    let record = ledger.find_by_correlation("ws_CO_A").await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Completed);
    assert_eq!(record.settled_amount, Some(Decimal::from(75)));
    assert_eq!(record.receipt.as_deref(), Some("ABC123"));
}

#[tokio::test]
async fn test_token_is_cached_across_submissions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(stk_ok("ws_CO_1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(stk_ok("ws_CO_2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();

    let first = strategy
        .initiate(&PaymentRequest::new(50, "0712345678", "FLIER-1", "Flier"))
        .await
        .unwrap();
    let second = strategy
        .initiate(&PaymentRequest::new(60, "+254722000111", "FLIER-2", "Flier"))
        .await
        .unwrap();

    assert_ne!(first.correlation_id, second.correlation_id);
    assert_eq!(ledger.len().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_is_single_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(config(&server));
    let tokens = Arc::new(TokenProvider::new(config, reqwest::Client::new()));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let tokens = tokens.clone();
        tasks.push(tokio::spawn(async move { tokens.acquire().await }));
    }

    for task in tasks {
        let token = task.await.unwrap().unwrap();
        assert_eq!(token.value, "tok-123");
    }
}

#[tokio::test]
async fn test_missing_credentials_fail_before_network() {
    let server = MockServer::start().await;
    let config = MpesaConfig::new("", "", "174379", "passkey", "https://pay.example.com")
        .with_api_base_url(server.uri());

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config, ledger.clone()).unwrap();

    let err = strategy
        .initiate(&PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier"))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_validation_fails_before_network() {
    let server = MockServer::start().await;
    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();

    for request in [
        PaymentRequest::new(0, "0712345678", "FLIER-1", "Flier"),
        PaymentRequest::new(75, "12345", "FLIER-1", "Flier"),
    ] {
        let err = strategy.initiate(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_gateway_error_writes_no_record() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "requestId": "1234-5678",
            "errorCode": "500.001.1001",
            "errorMessage": "Unable to lock subscriber, a transaction is already in process for the current subscriber"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();

    let err = strategy
        .initiate(&PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier"))
        .await
        .unwrap_err();

    match err {
        PaymentError::GatewaySubmit { code, .. } => assert_eq!(code, "500.001.1001"),
        other => panic!("expected GatewaySubmit, got {:?}", other),
    }
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_non_zero_response_code_writes_no_record() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "m",
            "CheckoutRequestID": "ws_CO_X",
            "ResponseCode": "1",
            "ResponseDescription": "Rejected"
        })))
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();

    let err = strategy
        .initiate(&PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier"))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::GatewaySubmit { .. }));
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_submission_timeout_is_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(stk_ok("ws_CO_SLOW").set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let config = config(&server).with_http_timeout(Duration::from_millis(300));
    let strategy = MpesaStrategy::new(config, ledger.clone()).unwrap();

    let err = strategy
        .initiate(&PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier"))
        .await
        .unwrap_err();

    match err {
        PaymentError::GatewaySubmit { code, .. } => assert_eq!(code, "timeout"),
        other => panic!("expected GatewaySubmit, got {:?}", other),
    }
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_token_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request - Invalid Credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = TokenProvider::new(Arc::new(config(&server)), reqwest::Client::new());
    let err = tokens.acquire().await.unwrap_err();

    assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
}

#[tokio::test]
async fn test_token_server_errors_retry_with_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let tokens = TokenProvider::new(Arc::new(config(&server)), reqwest::Client::new());
    let err = tokens.acquire().await.unwrap_err();

    assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
}

#[tokio::test]
async fn test_token_recovers_after_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok())
        .mount(&server)
        .await;

    let tokens = TokenProvider::new(Arc::new(config(&server)), reqwest::Client::new());
    let token = tokens.acquire().await.unwrap();

    assert_eq!(token.value, "tok-123");
}

#[tokio::test]
async fn test_abandoned_initiation_still_records_accepted_push() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(stk_ok("ws_CO_SLOW").set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();
    let request = PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier payment");

    let waited = tokio::time::timeout(Duration::from_millis(50), strategy.initiate(&request)).await;
    assert!(waited.is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;

    let record = ledger.find_by_correlation("ws_CO_SLOW").await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Pending);

    let outcome = strategy
        .reconcile(&success_callback("ws_CO_SLOW", 75, "SLOW123"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Settled {
            correlation_id: "ws_CO_SLOW".into(),
            status: PaymentStatus::Completed
        }
    );
}

#[tokio::test]
async fn test_padded_checkout_id_matches_callback() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(stk_ok("  ws_CO_PAD \n"))
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryLedger::new());
    let strategy = MpesaStrategy::new(config(&server), ledger.clone()).unwrap();
    let request = PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier payment");

    let handle = strategy.initiate(&request).await.unwrap();
    assert_eq!(handle.correlation_id, "ws_CO_PAD");

    let outcome = strategy
        .reconcile(&success_callback(" ws_CO_PAD", 75, "PAD123"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Settled {
            correlation_id: "ws_CO_PAD".into(),
            status: PaymentStatus::Completed
        }
    );
}
