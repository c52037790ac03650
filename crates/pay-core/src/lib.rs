//! # pay-core
//!
//! Core types and traits for push-payment initiation and reconciliation.
//!
//! This crate provides:
//! - `PaymentRecord`, `PaymentStatus` and `Settlement` for the record lifecycle
//! - `PaymentRequest` and `PendingHandle` for the initiation flow
//! - `PaymentLedger` trait and `InMemoryLedger` for record storage
//! - `PushPaymentStrategy` trait for gateway implementations
//! - `PaymentError` for typed error handling
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──► completed
//!    │
//!    └──────► failed
//! ```
//!
//! Both terminal states are final. The transition is applied by
//! [`PaymentLedger::settle`], which only succeeds while the record is
//! still pending.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pay_core::{PaymentRequest, PushPaymentStrategy};
//!
//! let request = PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier payment");
//! let handle = strategy.initiate(&request).await?;
//!
//! // Later, from the callback endpoint
//! let outcome = strategy.reconcile(&body).await?;
//! ```

pub mod error;
pub mod ledger;
pub mod record;
pub mod strategy;

// Re-exports for convenience
pub use error::{PaymentError, PaymentResult};
pub use ledger::{InMemoryLedger, PaymentLedger, SettleResult, SharedLedger};
pub use record::{
    CallbackOutcome, PaymentMethod, PaymentRecord, PaymentRequest, PaymentStatus, PendingHandle,
    Settlement, DEFAULT_PURPOSE,
};
pub use strategy::{BoxedPushPaymentStrategy, PushPaymentStrategy};

pub use rust_decimal::Decimal;
