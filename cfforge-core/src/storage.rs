//! Object storage key conventions
//!
//! These keys are shared with the API and workspace services and must not change.

use uuid::Uuid;

/// `artifacts/{projectId}/{buildId}[.ext]`
pub fn artifact_key(project_id: Uuid, build_id: Uuid, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("artifacts/{}/{}.{}", project_id, build_id, ext),
        _ => format!("artifacts/{}/{}", project_id, build_id),
    }
}

/// `sboms/{projectId}/{buildId}/sbom.json`
pub fn sbom_key(project_id: Uuid, build_id: Uuid) -> String {
    format!("sboms/{}/{}/sbom.json", project_id, build_id)
}

/// `workspaces/{projectId}/` - prefix of the project's source snapshot
pub fn workspace_prefix(project_id: Uuid) -> String {
    format!("workspaces/{}/", project_id)
}

/// File extension of an artifact key, if any (`jar`, `tar.gz`, ...)
pub fn artifact_extension(key: &str) -> Option<&str> {
    let file = key.rsplit('/').next()?;
    file.split_once('.').map(|(_, ext)| ext)
}
