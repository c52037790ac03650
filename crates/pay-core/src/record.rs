//! # Payment Records
//!
//! Ledger record, request and handle types for push payments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose tag used when the requester does not supply one
pub const DEFAULT_PURPOSE: &str = "flier_creation";

/// Payment method tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
        }
    }
}

/// Lifecycle status of a payment record.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Submitted, awaiting the gateway callback
    Pending,
    /// Payer approved and the gateway settled the amount
    Completed,
    /// Payer cancelled, timed out or the gateway declined
    Failed,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment request from the requester, before any validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in whole currency units
    pub amount: Decimal,

    /// Payer phone number as entered
    pub phone: String,

    /// Caller-supplied account reference
    pub reference: String,

    /// Short description shown to the payer
    pub description: String,

    /// Free-form transaction purpose tag
    pub purpose: String,

    /// Optional owner of the transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,
}

impl PaymentRequest {
    pub fn new(
        amount: impl Into<Decimal>,
        phone: impl Into<String>,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            phone: phone.into(),
            reference: reference.into(),
            description: description.into(),
            purpose: DEFAULT_PURPOSE.to_string(),
            user_ref: None,
        }
    }

    /// Set the purpose tag
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    /// Set the owning user reference
    pub fn with_user_ref(mut self, user_ref: impl Into<String>) -> Self {
        self.user_ref = Some(user_ref.into());
        self
    }
}

/// A transaction record owned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Internal record id
    pub id: String,

    /// Gateway-side correlation id (reconciliation key)
    pub correlation_id: String,

    /// Gateway's merchant-side request id
    pub merchant_request_id: String,

    /// Requested amount
    pub amount: Decimal,

    pub method: PaymentMethod,

    #[serde(default)]
    pub status: PaymentStatus,

    /// Transaction purpose tag
    #[serde(rename = "type")]
    pub purpose: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,

    /// Canonical payer number
    pub phone: String,

    pub reference: String,

    pub description: String,

    pub created_at: DateTime<Utc>,

    /// Set once, on the terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,

    /// Amount reported by the gateway (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_amount: Option<Decimal>,

    /// Gateway receipt number (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_code: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
}

impl PaymentRecord {
    /// Create a pending record for an acknowledged submission
    pub fn pending(
        correlation_id: impl Into<String>,
        merchant_request_id: impl Into<String>,
        request: &PaymentRequest,
        canonical_phone: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            merchant_request_id: merchant_request_id.into(),
            amount: request.amount,
            method: PaymentMethod::Mpesa,
            status: PaymentStatus::Pending,
            purpose: request.purpose.clone(),
            user_ref: request.user_ref.clone(),
            phone: canonical_phone.into(),
            reference: request.reference.clone(),
            description: request.description.clone(),
            created_at: Utc::now(),
            settled_at: None,
            settled_amount: None,
            receipt: None,
            result_code: None,
            result_desc: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, PaymentStatus::Pending)
    }

    /// Apply a terminal transition. Callers must have checked `is_pending`.
    pub(crate) fn apply(&mut self, settlement: &Settlement) {
        self.status = settlement.status();
        self.settled_at = Some(Utc::now());
        self.result_code = Some(settlement.result_code());
        self.result_desc = Some(settlement.result_desc().to_string());

        if let Settlement::Completed { amount, receipt, .. } = settlement {
            self.settled_amount = Some(*amount);
            self.receipt = Some(receipt.clone());
        }
    }
}

/// Terminal outcome reported by the gateway for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed {
        amount: Decimal,
        receipt: String,
        result_desc: String,
    },
    Failed {
        result_code: i64,
        result_desc: String,
    },
}

impl Settlement {
    pub fn status(&self) -> PaymentStatus {
        match self {
            Settlement::Completed { .. } => PaymentStatus::Completed,
            Settlement::Failed { .. } => PaymentStatus::Failed,
        }
    }

    pub fn result_code(&self) -> i64 {
        match self {
            Settlement::Completed { .. } => 0,
            Settlement::Failed { result_code, .. } => *result_code,
        }
    }

    pub fn result_desc(&self) -> &str {
        match self {
            Settlement::Completed { result_desc, .. } | Settlement::Failed { result_desc, .. } => {
                result_desc
            }
        }
    }
}

/// Returned to the requester once a submission is acknowledged and recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingHandle {
    pub record_id: String,
    pub correlation_id: String,
    pub merchant_request_id: String,
    /// Gateway message meant for the payer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
    pub status: PaymentStatus,
}

impl PendingHandle {
    pub fn from_record(record: &PaymentRecord, customer_message: Option<String>) -> Self {
        Self {
            record_id: record.id.clone(),
            correlation_id: record.correlation_id.clone(),
            merchant_request_id: record.merchant_request_id.clone(),
            customer_message,
            status: record.status,
        }
    }
}

/// Result of processing one inbound callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Pending record moved to a terminal state
    Settled {
        correlation_id: String,
        status: PaymentStatus,
    },
    /// Record was already terminal, nothing changed
    Duplicate { correlation_id: String },
    /// No record carries this correlation id
    Unmatched { correlation_id: String },
}
