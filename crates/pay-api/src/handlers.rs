//! # Request Handlers
//!
//! Axum request handlers for the payment API: STK push initiation, the
//! gateway callback, and read-only status queries over the ledger.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pay_core::{CallbackOutcome, Decimal, PaymentError, PaymentRequest, PendingHandle};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Initiate payment request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    /// Amount in whole currency units
    pub amount: Decimal,
    /// Payer phone, any common format
    pub phone_number: String,
    /// Account reference shown on the payer's statement
    pub account_reference: String,
    /// Short description shown in the prompt
    #[serde(default)]
    pub transaction_desc: String,
    /// Transaction purpose tag (optional)
    #[serde(default, rename = "type")]
    pub purpose: Option<String>,
    /// Owning user (optional)
    #[serde(default)]
    pub user_ref: Option<String>,
}

impl InitiatePaymentRequest {
    fn into_payment_request(self) -> PaymentRequest {
        let mut request = PaymentRequest::new(
            self.amount,
            self.phone_number,
            self.account_reference,
            self.transaction_desc,
        );
        if let Some(purpose) = self.purpose.filter(|p| !p.trim().is_empty()) {
            request = request.with_purpose(purpose);
        }
        if let Some(user_ref) = self.user_ref {
            request = request.with_user_ref(user_ref);
        }
        request
    }
}

/// Initiate payment response
#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub message: String,
    pub data: PendingHandle,
}

/// Acknowledgement body returned to the gateway
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }

    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        Self {
            result_code: 1,
            result_desc: format!("Rejected: {}", reason),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("retryable");
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mpesa-pay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Start an STK push. Returns once the gateway has acknowledged it.
#[instrument(skip(state, request), fields(reference = %request.account_reference))]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request = request.into_payment_request();

    info!(
        "Initiating payment: amount={}, reference={}, type={}",
        request.amount, request.reference, request.purpose
    );

    let handle = state.strategy.initiate(&request).await.map_err(|e| {
        match &e {
            PaymentError::Validation(_) => warn!("Rejected payment request: {}", e),
            _ => error!("Failed to initiate payment: {}", e),
        }
        payment_error_to_response(e)
    })?;

    Ok(Json(InitiatePaymentResponse {
        success: true,
        message: "Payment initiated successfully".to_string(),
        data: handle,
    }))
}

/// Gateway result callback.
///
/// Acknowledges every processed notification, including unmatched and
/// duplicate ones; only malformed bodies get a client error.
#[instrument(skip(state, body))]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CallbackAck>) {
    match state.strategy.reconcile(&body).await {
        Ok(outcome) => {
            match &outcome {
                CallbackOutcome::Settled {
                    correlation_id,
                    status,
                } => info!("Callback settled {} as {}", correlation_id, status),
                CallbackOutcome::Duplicate { correlation_id } => {
                    info!("Callback duplicate for {}", correlation_id)
                }
                CallbackOutcome::Unmatched { correlation_id } => {
                    warn!("Callback unmatched for {}", correlation_id)
                }
            }
            (StatusCode::OK, Json(CallbackAck::accepted()))
        }
        Err(PaymentError::CallbackMalformed(reason)) => {
            warn!("Malformed callback: {}", reason);
            (StatusCode::BAD_REQUEST, Json(CallbackAck::rejected(reason)))
        }
        Err(e) => {
            // Nothing was applied; a 5xx makes the gateway redeliver
            error!("Callback processing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallbackAck::rejected("temporarily unavailable")),
            )
        }
    }
}

/// Get a single payment by correlation id
pub async fn get_payment(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let record = state
        .ledger
        .find_by_correlation(&correlation_id)
        .await
        .map_err(payment_error_to_response)?
        .ok_or_else(|| {
            payment_error_to_response(PaymentError::RecordNotFound {
                correlation_id: correlation_id.clone(),
            })
        })?;

    Ok(Json(record))
}

/// List payments, newest first (reporting view)
pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let payments = state
        .ledger
        .list()
        .await
        .map_err(payment_error_to_response)?;

    Ok(Json(serde_json::json!({
        "payments": payments,
        "count": payments.len()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_payment_error_conversion() {
        let (status, _json) =
            payment_error_to_response(PaymentError::Validation("Bad amount".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) =
            payment_error_to_response(PaymentError::GatewayUnavailable("down".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json.details.as_deref(), Some("retryable"));
    }

    #[test]
    fn test_callback_ack_bodies() {
        let ok = serde_json::to_value(CallbackAck::accepted()).unwrap();
        assert_eq!(ok, serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"}));

        let rejected = CallbackAck::rejected("bad json");
        assert_eq!(rejected.result_code, 1);
        assert_eq!(rejected.result_desc, "Rejected: bad json");
    }

    #[test]
    fn test_request_mapping() {
        let request: InitiatePaymentRequest = serde_json::from_value(serde_json::json!({
            "amount": 75,
            "phoneNumber": "0712345678",
            "accountReference": "FLIER-1",
            "transactionDesc": "Flier payment",
            "userRef": "user-42"
        }))
        .unwrap();

        let request = request.into_payment_request();
        assert_eq!(request.amount, Decimal::from(75));
        assert_eq!(request.purpose, pay_core::DEFAULT_PURPOSE);
        assert_eq!(request.user_ref.as_deref(), Some("user-42"));
    }
}
