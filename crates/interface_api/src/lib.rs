//! HTTP API Layer
//!
//! This crate provides the REST API for clinic billing using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for billing, reports and health
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `{success: false, error, message, details?}` responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(service, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_billing::BillingService;

use crate::config::ApiConfig;
use crate::handlers::{billing, health, reports};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: BillingService,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `service` - Billing service over the chosen store
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(service: BillingService, config: ApiConfig) -> Router {
    let state = AppState { service, config };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let billing_routes = Router::new()
        .route("/appointments/:id/settle", post(billing::settle_appointment))
        .route("/lab-requests/:id/settle", post(billing::settle_lab_request))
        .route(
            "/invoices",
            post(billing::create_invoice).get(billing::list_invoices),
        )
        .route("/invoices/:id", get(billing::get_invoice))
        .route("/invoices/:id/payments", post(billing::add_payment))
        .route(
            "/prices",
            get(billing::list_prices).post(billing::create_price),
        )
        .route("/prices/:id", put(billing::update_price));

    let report_routes = Router::new()
        .route("/financial-summary", get(reports::financial_summary))
        .route("/payments-by-cashier", get(reports::payments_by_cashier));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/billing", billing_routes)
        .nest("/reports", report_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
