//! Project and target lookups

use async_trait::async_trait;
use cfforge_core::domain::project::{DeployTarget, Project};
use cfforge_engine::error::RepositoryError;
use cfforge_engine::repository::ProjectRepository;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use super::{PgRepository, backend, parse_column};

#[async_trait]
impl ProjectRepository for PgRepository {
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, slug, language, framework, manifest, env_vars
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Project::try_from).transpose()
    }

    async fn find_target(&self, id: Uuid) -> Result<Option<DeployTarget>, RepositoryError> {
        let row = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT id, api_endpoint, org_name, space_name, is_default
            FROM cf_targets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(DeployTarget::from))
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    slug: String,
    language: String,
    framework: Option<String>,
    manifest: Option<String>,
    env_vars: Json<HashMap<String, String>>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = RepositoryError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            name: row.name,
            slug: row.slug,
            language: parse_column(&row.language, row.id)?,
            framework: row.framework,
            manifest: row.manifest,
            env_vars: row.env_vars.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    api_endpoint: String,
    org_name: String,
    space_name: String,
    is_default: bool,
}

impl From<TargetRow> for DeployTarget {
    fn from(row: TargetRow) -> Self {
        DeployTarget {
            id: row.id,
            api_endpoint: row.api_endpoint,
            org_name: row.org_name,
            space_name: row.space_name,
            is_default: row.is_default,
        }
    }
}
