//! # Payment Ledger
//!
//! Storage seam for payment records. The ledger is the only state shared
//! between payment initiation and callback reconciliation.

use crate::error::{PaymentError, PaymentResult};
use crate::record::{PaymentRecord, PaymentStatus, Settlement};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of a conditional terminal transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResult {
    /// The record was pending and is now terminal
    Applied(PaymentRecord),
    /// The record was already terminal; nothing changed
    AlreadyTerminal(PaymentStatus),
    /// No record has this correlation id
    NotFound,
}

/// Durable store of payment records.
///
/// Implementations must make `settle` a single atomic update-if-still-pending.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Store a new pending record. Fails with `DuplicateRecord` if the
    /// correlation id is already taken.
    async fn insert(&self, record: PaymentRecord) -> PaymentResult<()>;

    /// Exact-match lookup by gateway correlation id.
    async fn find_by_correlation(&self, correlation_id: &str)
        -> PaymentResult<Option<PaymentRecord>>;

    /// Move a pending record to its terminal state.
    async fn settle(
        &self,
        correlation_id: &str,
        settlement: &Settlement,
    ) -> PaymentResult<SettleResult>;

    /// All records, newest first. Read-only view for reporting.
    async fn list(&self) -> PaymentResult<Vec<PaymentRecord>>;

    /// Current status for a correlation id
    async fn status(&self, correlation_id: &str) -> PaymentResult<Option<PaymentStatus>> {
        Ok(self
            .find_by_correlation(correlation_id)
            .await?
            .map(|record| record.status))
    }
}

/// Type alias for a shared ledger (dynamic dispatch)
pub type SharedLedger = Arc<dyn PaymentLedger>;

/// Process-local ledger keyed by correlation id
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<String, PaymentRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a shared handle
    pub fn shared() -> SharedLedger {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn insert(&self, record: PaymentRecord) -> PaymentResult<()> {
        if record.correlation_id.is_empty() {
            return Err(PaymentError::Ledger(
                "Record has an empty correlation id".to_string(),
            ));
        }

        let mut records = self.records.write().await;
        if records.contains_key(&record.correlation_id) {
            return Err(PaymentError::DuplicateRecord {
                correlation_id: record.correlation_id,
            });
        }
        records.insert(record.correlation_id.clone(), record);
        Ok(())
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        Ok(self.records.read().await.get(correlation_id).cloned())
    }

    async fn settle(
        &self,
        correlation_id: &str,
        settlement: &Settlement,
    ) -> PaymentResult<SettleResult> {
        // Check and set under one write guard
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(correlation_id) else {
            return Ok(SettleResult::NotFound);
        };

        if !record.is_pending() {
            return Ok(SettleResult::AlreadyTerminal(record.status));
        }

        record.apply(settlement);
        Ok(SettleResult::Applied(record.clone()))
    }

    async fn list(&self) -> PaymentResult<Vec<PaymentRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
