//! # M-Pesa Configuration
//!
//! Configuration management for the Daraja integration.
//! All secrets are loaded from environment variables.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pay_core::PaymentError;
use std::env;
use std::time::Duration;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Path appended to the callback base URL
pub const CALLBACK_PATH: &str = "/webhook/mpesa";

/// STK push transaction type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    /// Paybill shortcode
    PayBill,
    /// Till number (Buy Goods)
    BuyGoods,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::PayBill => "CustomerPayBillOnline",
            TransactionType::BuyGoods => "CustomerBuyGoodsOnline",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "CustomerPayBillOnline" => Some(TransactionType::PayBill),
            "CustomerBuyGoodsOnline" => Some(TransactionType::BuyGoods),
            _ => None,
        }
    }
}

impl Default for TransactionType {
    fn default() -> Self {
        TransactionType::PayBill
    }
}

/// Daraja API configuration
#[derive(Clone)]
pub struct MpesaConfig {
    /// OAuth consumer key
    pub consumer_key: String,

    /// OAuth consumer secret
    pub consumer_secret: String,

    /// Paybill or till shortcode
    pub business_shortcode: String,

    /// Passkey used to derive the STK password
    pub passkey: String,

    /// Public base URL the gateway delivers results to
    pub callback_base_url: String,

    /// API base URL (sandbox, production, or a mock in tests)
    pub api_base_url: String,

    pub transaction_type: TransactionType,

    /// Bound on every outbound call
    pub http_timeout: Duration,

    /// Attempts for token acquisition (submission is never retried)
    pub token_retry_attempts: u32,

    /// Delay before the first token retry; doubles per attempt
    pub token_retry_backoff: Duration,
}

impl MpesaConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `MPESA_CONSUMER_KEY`
    /// - `MPESA_CONSUMER_SECRET`
    /// - `MPESA_SHORTCODE`
    /// - `MPESA_PASSKEY`
    /// - `MPESA_CALLBACK_BASE_URL`
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PaymentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| required(&lookup, name);

        let consumer_key = require("MPESA_CONSUMER_KEY")?;
        let consumer_secret = require("MPESA_CONSUMER_SECRET")?;
        let business_shortcode = require("MPESA_SHORTCODE")?;
        let passkey = require("MPESA_PASSKEY")?;
        let callback_base_url = require("MPESA_CALLBACK_BASE_URL")?;

        if !business_shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::Configuration(
                "MPESA_SHORTCODE must be numeric".to_string(),
            ));
        }

        if !callback_base_url.starts_with("https://") && !callback_base_url.starts_with("http://")
        {
            return Err(PaymentError::Configuration(
                "MPESA_CALLBACK_BASE_URL must be an http(s) URL".to_string(),
            ));
        }

        let api_base_url = match lookup("MPESA_ENVIRONMENT").as_deref() {
            Some("production") => PRODUCTION_BASE_URL,
            Some("sandbox") | None => SANDBOX_BASE_URL,
            Some(other) => {
                return Err(PaymentError::Configuration(format!(
                    "MPESA_ENVIRONMENT must be sandbox or production, got {}",
                    other
                )))
            }
        };

        let transaction_type = match lookup("MPESA_TRANSACTION_TYPE") {
            Some(value) => TransactionType::parse(&value).ok_or_else(|| {
                PaymentError::Configuration(format!("Unknown MPESA_TRANSACTION_TYPE: {}", value))
            })?,
            None => TransactionType::default(),
        };

        let http_timeout = match lookup("MPESA_HTTP_TIMEOUT_SECS") {
            Some(value) => value.parse().map(Duration::from_secs).map_err(|_| {
                PaymentError::Configuration(
                    "MPESA_HTTP_TIMEOUT_SECS must be a whole number of seconds".to_string(),
                )
            })?,
            None => Duration::from_secs(30),
        };

        Ok(Self {
            transaction_type,
            http_timeout,
            api_base_url: api_base_url.to_string(),
            ..Self::new(
                consumer_key,
                consumer_secret,
                business_shortcode,
                passkey,
                callback_base_url,
            )
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        business_shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            business_shortcode: business_shortcode.into(),
            passkey: passkey.into(),
            callback_base_url: callback_base_url.into(),
            api_base_url: SANDBOX_BASE_URL.to_string(),
            transaction_type: TransactionType::default(),
            http_timeout: Duration::from_secs(30),
            token_retry_attempts: 3,
            token_retry_backoff: Duration::from_millis(200),
        }
    }

    /// Fail unless both consumer credentials are present
    pub fn ensure_credentials(&self) -> Result<(), PaymentError> {
        if self.consumer_key.trim().is_empty() || self.consumer_secret.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "M-Pesa consumer credentials not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the Basic authorization header value for the OAuth endpoint
    pub fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.consumer_key, self.consumer_secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    /// Full URL the gateway must post results to
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.callback_base_url.trim_end_matches('/'),
            CALLBACK_PATH
        )
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.api_base_url
        )
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.api_base_url)
    }

    /// Check if pointed at the sandbox
    pub fn is_sandbox(&self) -> bool {
        self.api_base_url == SANDBOX_BASE_URL
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_token_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.token_retry_attempts = attempts.max(1);
        self.token_retry_backoff = backoff;
        self
    }
}

impl std::fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .field("business_shortcode", &self.business_shortcode)
            .field("passkey", &"<redacted>")
            .field("callback_base_url", &self.callback_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("transaction_type", &self.transaction_type)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, PaymentError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PaymentError::Configuration(format!("{} not set", name))),
    }
}
