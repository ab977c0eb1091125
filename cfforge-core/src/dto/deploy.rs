//! Deploy DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deployment::DeployEnvironment;

/// Request to execute the most recent pending deployment of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub project_id: Uuid,
    pub environment: DeployEnvironment,
}

/// Request to replicate one deployment across several targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiDeployRequest {
    pub target_ids: Vec<Uuid>,
    /// Strategy name; the configured default applies when absent
    pub strategy: Option<String>,
    pub environment: DeployEnvironment,
    /// Build whose artifact is deployed; latest successful build when absent
    pub build_id: Option<Uuid>,
}
