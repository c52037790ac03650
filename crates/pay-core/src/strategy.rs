//! # Push Payment Strategy Trait
//!
//! Seam between the HTTP layer and a concrete push-payment gateway.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 PushPaymentStrategy (trait)                 │
//! │  ├── initiate()        submit + record pending              │
//! │  ├── reconcile()       inbound callback -> terminal state   │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                    ┌───────┴───────┐
//!                    │ MpesaStrategy │
//!                    └───────────────┘
//! ```
//!
//! Initiation and reconciliation never share in-process state; both talk
//! to the same [`PaymentLedger`](crate::ledger::PaymentLedger).

use crate::error::PaymentResult;
use crate::record::{CallbackOutcome, PaymentRequest, PendingHandle};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PushPaymentStrategy: Send + Sync {
    /// Validate the request, submit it to the gateway and record it as pending.
    ///
    /// Returns once the gateway acknowledges the submission. Never retries.
    async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<PendingHandle>;

    /// Process one raw callback body from the gateway.
    ///
    /// `Err(CallbackMalformed)` means the payload was rejected without
    /// touching the ledger; every `Ok` outcome should be acknowledged.
    async fn reconcile(&self, payload: &[u8]) -> PaymentResult<CallbackOutcome>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;

    /// Path the gateway delivers callbacks to.
    /// Default: `/webhook/{provider_name}`
    fn callback_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Type alias for a boxed strategy (dynamic dispatch)
pub type BoxedPushPaymentStrategy = Arc<dyn PushPaymentStrategy>;
