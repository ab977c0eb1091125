//! Build DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to build the most recent queued build of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub project_id: Uuid,
}
