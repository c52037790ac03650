//! # Payment Error Types
//!
//! Typed error handling for push-payment initiation and reconciliation.
//! All payment operations return `Result<T, PaymentError>`.

use thiserror::Error;

/// Core error type for all payment operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Missing or invalid secrets / gateway identity. Raised before any network activity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bad amount, phone number or reference. Never reaches the gateway.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authorization endpoint unreachable, timed out or refused to issue a token
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Push submission failed (network, timeout or non-success response)
    #[error("Gateway rejected submission [{code}]: {message}")]
    GatewaySubmit { code: String, message: String },

    /// Inbound callback payload could not be parsed
    #[error("Malformed callback: {0}")]
    CallbackMalformed(String),

    /// Callback correlation id matched no record
    #[error("No payment record for correlation id {correlation_id}")]
    CallbackUnmatched { correlation_id: String },

    /// A record with this correlation id already exists
    #[error("Duplicate payment record for correlation id {correlation_id}")]
    DuplicateRecord { correlation_id: String },

    /// Status query for an unknown correlation id
    #[error("Payment record not found: {correlation_id}")]
    RecordNotFound { correlation_id: String },

    /// Ledger read or write failed
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Shorthand for a submission failure that has no gateway error code
    pub fn submit(message: impl Into<String>) -> Self {
        PaymentError::GatewaySubmit {
            code: "unknown".to_string(),
            message: message.into(),
        }
    }

    /// Returns true if a caller may reasonably retry the operation.
    ///
    /// The core itself never retries a submission.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::GatewayUnavailable(_) | PaymentError::Ledger(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::Validation(_) => 400,
            PaymentError::GatewayUnavailable(_) => 503,
            PaymentError::GatewaySubmit { .. } => 502,
            PaymentError::CallbackMalformed(_) => 400,
            // Acknowledged as success so the gateway stops redelivering
            PaymentError::CallbackUnmatched { .. } => 200,
            PaymentError::DuplicateRecord { .. } => 409,
            PaymentError::RecordNotFound { .. } => 404,
            PaymentError::Ledger(_) => 500,
            PaymentError::Serialization(_) => 500,
        }
    }
}

/// Result type alias for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(PaymentError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(!PaymentError::submit("rejected").is_retryable());
        assert!(!PaymentError::Validation("bad amount".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PaymentError::Validation("test".into()).status_code(), 400);
        assert_eq!(
            PaymentError::CallbackMalformed("not json".into()).status_code(),
            400
        );
        assert_eq!(
            PaymentError::CallbackUnmatched {
                correlation_id: "ws_CO_1".into()
            }
            .status_code(),
            200
        );
        assert_eq!(PaymentError::submit("boom").status_code(), 502);
    }

    #[test]
    fn test_submit_display() {
        let err = PaymentError::GatewaySubmit {
            code: "500.001.1001".into(),
            message: "Unable to lock subscriber".into(),
        };
        assert_eq!(
            err.to_string(),
            "Gateway rejected submission [500.001.1001]: Unable to lock subscriber"
        );
    }
}
