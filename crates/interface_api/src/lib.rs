//! HTTP API Layer
//!
//! REST API for the agency portal, built on Axum.
//!
//! # Architecture
//!
//! - **Handlers**: payments, invoices, visit notes, health
//! - **Middleware**: JWT authentication and audit logging
//! - **DTOs**: response bodies for billing resources
//! - **Error Handling**: domain errors mapped to consistent JSON responses
//!
//! The router is built over [`Adapters`], so the same routes run against
//! PostgreSQL/Stripe in the server binary and against in-memory mocks in
//! tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, Adapters, AppState};
//!
//! let state = AppState::new(config, adapters);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_billing::{
    BillingStore, EmailTemplates, InvoiceMailer, Notifier, PaymentGateway, PaymentService,
    StaffDirectory,
};
use domain_care::{VisitNoteService, VisitNoteStore};

use crate::config::ApiConfig;
use crate::handlers::{health, invoices, payments, visit_notes};
use crate::middleware::{audit_middleware, auth_middleware};

/// The port implementations the API runs on
#[derive(Clone)]
pub struct Adapters {
    pub billing_store: Arc<dyn BillingStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub staff: Arc<dyn StaffDirectory>,
    pub visit_notes: Arc<dyn VisitNoteStore>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub adapters: Adapters,
    pub payments: PaymentService,
    pub invoices: InvoiceMailer,
    pub visit_notes: VisitNoteService,
}

impl AppState {
    /// Wires the domain services over `adapters`
    pub fn new(config: ApiConfig, adapters: Adapters) -> Self {
        let templates = EmailTemplates::new(config.agency_name.clone(), config.agency_timezone);

        let payments = PaymentService::new(
            adapters.billing_store.clone(),
            adapters.gateway.clone(),
            adapters.notifier.clone(),
            adapters.staff.clone(),
            templates.clone(),
        );
        let invoices = InvoiceMailer::new(
            adapters.billing_store.clone(),
            adapters.notifier.clone(),
            templates,
        );
        let visit_notes = VisitNoteService::new(adapters.visit_notes.clone(), config.agency_timezone);

        Self {
            config,
            adapters,
            payments,
            invoices,
            visit_notes,
        }
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let payment_routes = Router::new().route("/", post(payments::process_payment));

    let invoice_routes = Router::new()
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/payments", get(invoices::list_payments))
        .route("/:id/send", post(invoices::send_invoice));

    let visit_note_routes = Router::new()
        .route("/", post(visit_notes::submit_note).get(visit_notes::list_notes))
        .route(
            "/draft",
            get(visit_notes::get_draft)
                .put(visit_notes::save_draft)
                .delete(visit_notes::discard_draft),
        )
        .route("/:id", get(visit_notes::get_note));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/payments", payment_routes)
        .nest("/invoices", invoice_routes)
        .nest("/visit-notes", visit_note_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
