//! Message intake handlers
//!
//! Build and deploy requests are queued for the consumer and acknowledged
//! immediately. Rollback and multi-target deploys run inline and return
//! their outcome.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cfforge_core::domain::deployment::DeploymentJob;
use cfforge_core::dto::build::BuildRequest;
use cfforge_core::dto::deploy::{DeployRequest, MultiDeployRequest};
use cfforge_engine::deploy::DeployResult;
use serde_json::{Value, json};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::consumer::Message;

/// POST /messages/build
pub async fn enqueue_build(
    State(state): State<AppState>,
    Json(req): Json<BuildRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    tracing::info!(project_id = %req.project_id, "Build request received");
    enqueue(&state, Message::Build(req)).await
}

/// POST /messages/deploy
pub async fn enqueue_deploy(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    tracing::info!(
        project_id = %req.project_id,
        environment = %req.environment,
        "Deploy request received"
    );
    enqueue(&state, Message::Deploy(req)).await
}

async fn enqueue(state: &AppState, message: Message) -> ApiResult<(StatusCode, Json<Value>)> {
    let project_id = message.project_id();
    state
        .intake
        .send(message)
        .await
        .map_err(|_| ApiError::ServiceUnavailable("Message consumer is not running".to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "projectId": project_id })),
    ))
}

/// POST /deployments/{id}/rollback
pub async fn rollback_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentJob>> {
    tracing::info!(deployment_id = %id, "Rollback requested");
    let job = state.deploy.rollback_deployment(id).await?;
    Ok(Json(job))
}

/// POST /projects/{id}/multi-deploy
pub async fn multi_deploy(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<MultiDeployRequest>,
) -> ApiResult<Json<HashMap<Uuid, DeployResult>>> {
    if req.target_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "targetIds must name at least one target".to_string(),
        ));
    }

    tracing::info!(
        %project_id,
        targets = req.target_ids.len(),
        "Multi-target deployment requested"
    );
    let results = state.deploy.deploy_to_targets(project_id, &req).await?;
    Ok(Json(results))
}
