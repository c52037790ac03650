//! # mpesa-pay
//!
//! M-Pesa STK push service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export MPESA_CONSUMER_KEY=...
//! export MPESA_CONSUMER_SECRET=...
//! export MPESA_SHORTCODE=174379
//! export MPESA_PASSKEY=...
//! export MPESA_CALLBACK_BASE_URL=https://pay.example.com
//!
//! # Run the server
//! mpesa-pay
//! ```

use pay_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Initialize application state; missing M-Pesa options fail here
    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment provider: {}", state.strategy.provider_name());

    let callback_path = state.callback_path();

    // Create router
    let app = routes::create_router(state);

    info!("mpesa-pay starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("STK push: POST http://{}/api/v1/mpesa/stkpush", addr);
        info!("Callback: POST http://{}{}", addr, callback_path);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy()
    };

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
