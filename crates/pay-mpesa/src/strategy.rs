//! # M-Pesa Push Payment Strategy
//!
//! Wires the token cache, STK push initiator and callback receiver over a
//! shared HTTP client and ledger.
//!
//! Initiation runs on its own task. Once the push is submitted the pending
//! record is written even if the caller stops waiting.

use crate::callback::CallbackReceiver;
use crate::config::MpesaConfig;
use crate::stk::StkPushInitiator;
use crate::token::TokenProvider;
use async_trait::async_trait;
use pay_core::{
    CallbackOutcome, PaymentError, PaymentRequest, PaymentResult, PendingHandle,
    PushPaymentStrategy, SharedLedger,
};
use reqwest::Client;
use std::sync::Arc;
use tracing::{error, Instrument};

pub struct MpesaStrategy {
    config: Arc<MpesaConfig>,
    initiator: Arc<StkPushInitiator>,
    receiver: CallbackReceiver,
}

impl MpesaStrategy {
    /// Create a strategy over the given ledger
    pub fn new(config: MpesaConfig, ledger: SharedLedger) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let config = Arc::new(config);
        let tokens = Arc::new(TokenProvider::new(config.clone(), client.clone()));
        let initiator = Arc::new(StkPushInitiator::new(
            config.clone(),
            client,
            tokens,
            ledger.clone(),
        ));
        let receiver = CallbackReceiver::new(ledger);

        Ok(Self {
            config,
            initiator,
            receiver,
        })
    }

    /// Create from environment variables
    pub fn from_env(ledger: SharedLedger) -> PaymentResult<Self> {
        let config = MpesaConfig::from_env()?;
        Self::new(config, ledger)
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    pub fn receiver(&self) -> &CallbackReceiver {
        &self.receiver
    }
}

#[async_trait]
impl PushPaymentStrategy for MpesaStrategy {
    async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<PendingHandle> {
        let initiator = self.initiator.clone();
        let request = request.clone();

        tokio::spawn(async move { initiator.initiate(&request).await }.in_current_span())
            .await
            .map_err(|e| {
                error!("STK push task failed: {}", e);
                PaymentError::submit(format!("STK push task failed: {}", e))
            })?
    }

    async fn reconcile(&self, payload: &[u8]) -> PaymentResult<CallbackOutcome> {
        self.receiver.handle(payload).await
    }

    fn provider_name(&self) -> &'static str {
        "mpesa"
    }
}
