//! # Application State
//!
//! Shared state for the Axum application.
//! Holds the push-payment strategy, the ledger it writes to, and server config.

use pay_core::{BoxedPushPaymentStrategy, InMemoryLedger, SharedLedger};
use pay_mpesa::MpesaStrategy;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Upper bound on handling one inbound request
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or unparsable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            request_timeout: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60)),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Push-payment strategy (M-Pesa)
    pub strategy: BoxedPushPaymentStrategy,
    /// Ledger shared by initiation, callbacks and status reads
    pub ledger: SharedLedger,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create a new AppState with the M-Pesa strategy over an in-memory ledger.
    ///
    /// Fails at startup if any required M-Pesa option is missing.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let ledger = InMemoryLedger::shared();

        let strategy = MpesaStrategy::from_env(ledger.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize M-Pesa: {}", e))?;

        Ok(Self::with_strategy(Arc::new(strategy), ledger, config))
    }

    /// Assemble state from parts (tests, alternative ledgers)
    pub fn with_strategy(
        strategy: BoxedPushPaymentStrategy,
        ledger: SharedLedger,
        config: AppConfig,
    ) -> Self {
        Self {
            strategy,
            ledger,
            config,
        }
    }

    /// Path the gateway posts callbacks to
    pub fn callback_path(&self) -> String {
        self.strategy.callback_path()
    }
}
