//! API Module
//!
//! HTTP intake of the worker: the message channel plus the synchronous
//! rollback and multi-target deploy actions.

pub mod error;
pub mod health;
pub mod messages;

use axum::{
    Router,
    routing::{get, post},
};
use cfforge_engine::deploy::dispatcher::DeployDispatcher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::consumer::Message;

#[derive(Clone)]
pub struct AppState {
    pub intake: mpsc::Sender<Message>,
    pub deploy: Arc<DeployDispatcher>,
}

/// Create the intake router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/messages/build", post(messages::enqueue_build))
        .route("/messages/deploy", post(messages::enqueue_deploy))
        .route(
            "/deployments/{id}/rollback",
            post(messages::rollback_deployment),
        )
        .route("/projects/{id}/multi-deploy", post(messages::multi_deploy))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
