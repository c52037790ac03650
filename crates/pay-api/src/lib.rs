//! # pay-api
//!
//! HTTP API layer for the M-Pesa payment service.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - STK push initiation endpoint
//! - Gateway callback handler
//! - Read-only payment status endpoints
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/mpesa/stkpush` | Initiate STK push |
//! | GET | `/api/v1/payments` | List payments |
//! | GET | `/api/v1/payments/{correlation_id}` | Payment status |
//! | POST | `/webhook/mpesa` | M-Pesa result callback |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
