//! # STK Push Initiation
//!
//! Validates a payment request, submits a Lipa Na M-Pesa Online (STK push)
//! request and records the pending transaction. Submissions are never
//! retried: a repeated push would prompt the payer twice.

use crate::config::MpesaConfig;
use crate::phone::normalize_phone;
use crate::token::{AccessToken, TokenProvider};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use pay_core::{
    Decimal, PaymentError, PaymentRecord, PaymentRequest, PaymentResult, PendingHandle,
    SharedLedger,
};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// `YYYYMMDDHHmmss`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Gateway limit on `AccountReference`
pub const MAX_REFERENCE_LEN: usize = 12;

/// Gateway limit on `TransactionDesc`
pub const MAX_DESCRIPTION_LEN: usize = 13;

/// Format a timestamp the way the STK password expects it
pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// A request that passed validation, ready to go on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub amount: u64,
    pub phone: String,
    pub reference: String,
    pub description: String,
}

/// Check amount, phone, reference and description without touching the network.
pub fn validate_request(request: &PaymentRequest) -> PaymentResult<ValidatedRequest> {
    if request.amount <= Decimal::ZERO {
        return Err(PaymentError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if !request.amount.fract().is_zero() {
        return Err(PaymentError::Validation(
            "Amount must be a whole number".to_string(),
        ));
    }
    let amount = request
        .amount
        .to_u64()
        .ok_or_else(|| PaymentError::Validation("Amount out of range".to_string()))?;

    let phone = normalize_phone(&request.phone)?;

    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(PaymentError::Validation(
            "Account reference is required".to_string(),
        ));
    }
    if reference.chars().count() > MAX_REFERENCE_LEN {
        return Err(PaymentError::Validation(format!(
            "Account reference must be at most {} characters",
            MAX_REFERENCE_LEN
        )));
    }

    let description = match request.description.trim() {
        "" => reference,
        text => text,
    };
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(PaymentError::Validation(format!(
            "Transaction description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    Ok(ValidatedRequest {
        amount,
        phone,
        reference: reference.to_string(),
        description: description.to_string(),
    })
}

/// Submits STK push requests and records them in the ledger
pub struct StkPushInitiator {
    config: Arc<MpesaConfig>,
    client: Client,
    tokens: Arc<TokenProvider>,
    ledger: SharedLedger,
}

impl StkPushInitiator {
    pub fn new(
        config: Arc<MpesaConfig>,
        client: Client,
        tokens: Arc<TokenProvider>,
        ledger: SharedLedger,
    ) -> Self {
        Self {
            config,
            client,
            tokens,
            ledger,
        }
    }

    /// Build the wire payload for a validated request
    fn build_payload(&self, request: &ValidatedRequest, timestamp: &str) -> StkPushPayload {
        StkPushPayload {
            business_short_code: self.config.business_shortcode.clone(),
            password: stk_password(
                &self.config.business_shortcode,
                &self.config.passkey,
                timestamp,
            ),
            timestamp: timestamp.to_string(),
            transaction_type: self.config.transaction_type.as_str().to_string(),
            amount: request.amount,
            party_a: request.phone.clone(),
            party_b: self.config.business_shortcode.clone(),
            phone_number: request.phone.clone(),
            callback_url: self.config.callback_url(),
            account_reference: request.reference.clone(),
            transaction_desc: request.description.clone(),
        }
    }

    /// Validate, submit and record a payment.
    ///
    /// The pending record is written before the handle is returned, so every
    /// acknowledged submission can be reconciled. A failed submission writes
    /// nothing.
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<PendingHandle> {
        let validated = validate_request(request)?;
        let token = self.tokens.acquire().await?;

        let timestamp = stk_timestamp(Utc::now());
        let payload = self.build_payload(&validated, &timestamp);

        debug!(
            "Submitting STK push: amount={}, phone={}, reference={}",
            validated.amount, validated.phone, validated.reference
        );

        let ack = self.submit(&token, &payload).await?;

        let mut recorded = request.clone();
        recorded.reference = validated.reference.clone();
        recorded.description = validated.description.clone();
        let record = PaymentRecord::pending(
            ack.checkout_request_id,
            ack.merchant_request_id,
            &recorded,
            validated.phone,
        );

        if let Err(e) = self.ledger.insert(record.clone()).await {
            // Gateway already pushed the prompt; the callback will arrive unmatched
            error!(
                "Failed to record acknowledged STK push: correlation_id={}, error={}",
                record.correlation_id, e
            );
            return Err(e);
        }

        info!(
            "STK push initiated: record_id={}, correlation_id={}",
            record.id, record.correlation_id
        );

        Ok(PendingHandle::from_record(&record, ack.customer_message))
    }

    async fn submit(
        &self,
        token: &AccessToken,
        payload: &StkPushPayload,
    ) -> PaymentResult<StkPushResponse> {
        let response = self
            .client
            .post(self.config.stk_push_url())
            .header("Authorization", token.bearer_header())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let code = if e.is_timeout() { "timeout" } else { "network" };
                PaymentError::GatewaySubmit {
                    code: code.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::submit(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Gateway rejected bearer token, clearing cache");
            self.tokens.invalidate().await;
        }

        if !status.is_success() {
            error!("STK push error: status={}, body={}", status, body);

            if let Ok(err) = serde_json::from_str::<DarajaErrorResponse>(&body) {
                return Err(PaymentError::GatewaySubmit {
                    code: err.error_code,
                    message: err.error_message,
                });
            }

            return Err(PaymentError::GatewaySubmit {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        let mut ack: StkPushResponse = serde_json::from_str(&body).map_err(|e| {
            PaymentError::submit(format!("Failed to parse STK push response: {}", e))
        })?;
        // Stored ids must match the trimmed ids callbacks are looked up by
        ack.checkout_request_id = ack.checkout_request_id.trim().to_string();
        ack.merchant_request_id = ack.merchant_request_id.trim().to_string();

        if ack.response_code != "0" {
            return Err(PaymentError::GatewaySubmit {
                code: ack.response_code,
                message: ack.response_description,
            });
        }

        if ack.checkout_request_id.is_empty() {
            return Err(PaymentError::submit(
                "Acknowledgement carried no CheckoutRequestID",
            ));
        }

        Ok(ack)
    }
}

// =============================================================================
// Daraja API Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushPayload {
    business_short_code: String,
    password: String,
    timestamp: String,
    transaction_type: String,
    amount: u64,
    party_a: String,
    party_b: String,
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    account_reference: String,
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode", deserialize_with = "code_as_string")]
    response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DarajaErrorResponse {
    #[serde(rename = "errorCode")]
    error_code: String,
    #[serde(rename = "errorMessage")]
    error_message: String,
}

fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s.trim().to_string(),
    })
}
