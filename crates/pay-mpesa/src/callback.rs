//! # STK Callback Handling
//!
//! Parses the gateway's asynchronous result notification and applies the
//! terminal transition to the matching ledger record.
//!
//! Delivery is at-least-once and unordered across payments. Correlation is
//! by exact `CheckoutRequestID`; the transition itself is the ledger's
//! conditional `settle`, so duplicate deliveries change nothing.

use pay_core::{
    CallbackOutcome, Decimal, PaymentError, PaymentResult, PaymentStatus, SettleResult,
    Settlement, SharedLedger,
};
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// Metadata key carrying the settled amount
pub const AMOUNT_KEY: &str = "Amount";

/// Metadata key carrying the gateway receipt number
pub const RECEIPT_KEY: &str = "MpesaReceiptNumber";

pub const PHONE_KEY: &str = "PhoneNumber";

/// Result code the gateway uses for a successful payment
pub const SUCCESS_RESULT_CODE: i64 = 0;

/// A callback that parsed cleanly, before any ledger access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCallback {
    pub correlation_id: String,
    pub merchant_request_id: Option<String>,
    pub settlement: Settlement,
    /// Payer number echoed back on success
    pub payer_phone: Option<String>,
}

/// Parse a raw callback body.
///
/// Metadata keys are matched exactly. A success callback without both
/// `Amount` and `MpesaReceiptNumber` is rejected rather than guessed.
pub fn parse_callback(payload: &[u8]) -> PaymentResult<ParsedCallback> {
    let envelope: CallbackEnvelope = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::CallbackMalformed(format!("Invalid callback body: {}", e)))?;

    let callback = envelope.body.stk_callback;
    let correlation_id = callback.checkout_request_id.trim().to_string();
    if correlation_id.is_empty() {
        return Err(PaymentError::CallbackMalformed(
            "Empty CheckoutRequestID".to_string(),
        ));
    }

    let items = callback
        .callback_metadata
        .map(|metadata| metadata.items)
        .unwrap_or_default();

    let settlement = if callback.result_code == SUCCESS_RESULT_CODE {
        let amount = find_item(&items, AMOUNT_KEY)
            .and_then(decimal_value)
            .ok_or_else(|| {
                PaymentError::CallbackMalformed(format!(
                    "Success callback without a valid {}",
                    AMOUNT_KEY
                ))
            })?;

        let receipt = find_item(&items, RECEIPT_KEY)
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|receipt| !receipt.is_empty())
            .ok_or_else(|| {
                PaymentError::CallbackMalformed(format!(
                    "Success callback without a valid {}",
                    RECEIPT_KEY
                ))
            })?;

        Settlement::Completed {
            amount,
            receipt: receipt.to_string(),
            result_desc: callback.result_desc,
        }
    } else {
        Settlement::Failed {
            result_code: callback.result_code,
            result_desc: callback.result_desc,
        }
    };

    let payer_phone = find_item(&items, PHONE_KEY).and_then(|value| match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    });

    Ok(ParsedCallback {
        correlation_id,
        merchant_request_id: callback.merchant_request_id,
        settlement,
        payer_phone,
    })
}

fn find_item<'a>(items: &'a [MetadataItem], name: &str) -> Option<&'a serde_json::Value> {
    items
        .iter()
        .find(|item| item.name == name)
        .and_then(|item| item.value.as_ref())
}

fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
}

/// Stateless callback handler over the shared ledger
#[derive(Clone)]
pub struct CallbackReceiver {
    ledger: SharedLedger,
}

impl CallbackReceiver {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    /// Process one notification.
    ///
    /// `Err(CallbackMalformed)` leaves the ledger untouched. Unmatched and
    /// duplicate callbacks are `Ok` so the caller acknowledges them.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn handle(&self, payload: &[u8]) -> PaymentResult<CallbackOutcome> {
        let callback = parse_callback(payload).map_err(|e| {
            warn!("Rejected M-Pesa callback: {}", e);
            e
        })?;
        let correlation_id = callback.correlation_id;

        debug!(
            "M-Pesa callback: correlation_id={}, merchant_request_id={:?}, result_code={}",
            correlation_id,
            callback.merchant_request_id,
            callback.settlement.result_code()
        );

        match self.ledger.settle(&correlation_id, &callback.settlement).await? {
            SettleResult::Applied(record) => {
                if let Some(settled) = record.settled_amount {
                    if settled != record.amount {
                        warn!(
                            "Settled amount differs from request: correlation_id={}, requested={}, settled={}",
                            correlation_id, record.amount, settled
                        );
                    }
                }
                info!(
                    "Payment {}: correlation_id={}, receipt={:?}, payer={:?}, desc={}",
                    record.status,
                    correlation_id,
                    record.receipt,
                    callback.payer_phone,
                    callback.settlement.result_desc()
                );
                Ok(CallbackOutcome::Settled {
                    correlation_id,
                    status: record.status,
                })
            }
            SettleResult::AlreadyTerminal(status) => {
                info!(
                    "Duplicate callback ignored: correlation_id={}, status={}",
                    correlation_id, status
                );
                Ok(CallbackOutcome::Duplicate { correlation_id })
            }
            SettleResult::NotFound => {
                let unmatched = PaymentError::CallbackUnmatched {
                    correlation_id: correlation_id.clone(),
                };
                warn!("{}", unmatched);
                Ok(CallbackOutcome::Unmatched { correlation_id })
            }
        }
    }

    /// Read-only status lookup for the requester
    pub async fn status(&self, correlation_id: &str) -> PaymentResult<Option<PaymentStatus>> {
        self.ledger.status(correlation_id).await
    }
}

// =============================================================================
// Callback Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: RawStkCallback,
}

#[derive(Debug, Deserialize)]
struct RawStkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "result_code")]
    result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<serde_json::Value>,
}

/// Accept `0` or `"0"`; anything non-integral is malformed.
fn result_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
