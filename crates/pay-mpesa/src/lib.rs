//! # pay-mpesa
//!
//! M-Pesa (Daraja) push-payment strategy.
//!
//! This crate provides:
//!
//! 1. **TokenProvider** - OAuth client-credentials token, cached process-wide
//!    with single-flight refresh
//! 2. **StkPushInitiator** - validation, phone normalization, password
//!    derivation and STK push submission; records the pending payment
//! 3. **CallbackReceiver** - parses the result callback and settles the
//!    matching record exactly once
//! 4. **MpesaStrategy** - all of the above behind `PushPaymentStrategy`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pay_core::{InMemoryLedger, PaymentRequest, PushPaymentStrategy};
//! use pay_mpesa::MpesaStrategy;
//!
//! let strategy = MpesaStrategy::from_env(InMemoryLedger::shared())?;
//!
//! let request = PaymentRequest::new(75, "0712345678", "FLIER-1", "Flier payment");
//! let handle = strategy.initiate(&request).await?;
//!
//! // The payer approves on their phone; the gateway then posts to
//! // {MPESA_CALLBACK_BASE_URL}/webhook/mpesa
//! let outcome = strategy.reconcile(&callback_body).await?;
//! ```

pub mod callback;
pub mod config;
pub mod phone;
pub mod stk;
pub mod strategy;
pub mod token;

// Re-exports
pub use callback::{parse_callback, CallbackReceiver, ParsedCallback};
pub use config::{MpesaConfig, TransactionType};
pub use phone::normalize_phone;
pub use stk::{stk_password, stk_timestamp, validate_request, StkPushInitiator};
pub use strategy::MpesaStrategy;
pub use token::{AccessToken, TokenProvider};
