pub mod health;
pub mod optimistic;
pub mod state;
pub mod transactions;

use crate::sync::{SyncEngine, TransactionService};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub transactions: TransactionService,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, transactions: TransactionService) -> Self {
        Self {
            engine,
            transactions,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/state", get(state::get_state))
        .route("/v1/account", put(state::put_account))
        .route("/v1/refresh", post(state::post_refresh))
        .route("/v1/error", delete(state::dismiss_error))
        .route(
            "/v1/notifications/:id",
            delete(state::dismiss_notification),
        )
        .route("/v1/optimistic/deposit", post(optimistic::add_deposit))
        .route("/v1/optimistic/withdrawal", post(optimistic::add_withdrawal))
        .route("/v1/optimistic/claim", post(optimistic::add_claim))
        .route("/v1/optimistic/risk", post(optimistic::add_risk_update))
        .route("/v1/optimistic/:id", delete(optimistic::resolve))
        .route("/v1/transactions/deposit", post(transactions::deposit))
        .route(
            "/v1/transactions/withdrawal",
            post(transactions::request_withdrawal),
        )
        .route("/v1/transactions/claim", post(transactions::claim))
        .route("/v1/transactions/risk", post(transactions::update_risk))
        .layer(cors)
        .with_state(state)
}
