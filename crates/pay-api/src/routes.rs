//! # Routes
//!
//! Axum router configuration for the payment API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - API:
///   - POST /api/v1/mpesa/stkpush - Initiate an STK push
///   - GET  /api/v1/payments - List payment records
///   - GET  /api/v1/payments/{correlation_id} - Get one payment record
///
/// - Webhooks:
///   - POST /webhook/mpesa - Gateway result callback
pub fn create_router(state: AppState) -> Router {
    // Browser callers reach the initiation endpoint directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/mpesa/stkpush", post(handlers::initiate_payment))
        .route("/payments", get(handlers::list_payments))
        .route("/payments/{correlation_id}", get(handlers::get_payment));

    let callback_path = state.callback_path();
    let request_timeout = state.config.request_timeout;

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        // API v1
        .nest("/api/v1", api_routes)
        // Gateway callback (raw body)
        .route(&callback_path, post(handlers::mpesa_callback))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(cors),
        )
        // State
        .with_state(state)
}
