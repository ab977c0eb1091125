//! Deployment repository

use async_trait::async_trait;
use cfforge_core::domain::deployment::{DeployEnvironment, DeploymentJob};
use cfforge_engine::error::RepositoryError;
use cfforge_engine::repository::DeploymentRepository;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PgRepository, backend, parse_column};

const SELECT_DEPLOYMENT: &str = r#"
    SELECT id, project_id, build_id, strategy, environment, status, manifest, deployment_url,
           deploy_log, error_message, previous_deployment_id, duration_ms, created_at, updated_at
    FROM deployments
"#;

#[async_trait]
impl DeploymentRepository for PgRepository {
    async fn latest_deployment(
        &self,
        project_id: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            "{SELECT_DEPLOYMENT} WHERE project_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(DeploymentJob::try_from).transpose()
    }

    async fn find_deployment(&self, id: Uuid) -> Result<Option<DeploymentJob>, RepositoryError> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!("{SELECT_DEPLOYMENT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(DeploymentJob::try_from).transpose()
    }

    async fn last_deployed(
        &self,
        project_id: Uuid,
        environment: DeployEnvironment,
        excluding: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            "{SELECT_DEPLOYMENT} WHERE project_id = $1 AND environment = $2 \
             AND status = 'DEPLOYED' AND id <> $3 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(project_id)
        .bind(environment.as_str())
        .bind(excluding)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(DeploymentJob::try_from).transpose()
    }

    async fn save_deployment(&self, deployment: &DeploymentJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO deployments (id, project_id, build_id, strategy, environment, status,
                                     manifest, deployment_url, deploy_log, error_message,
                                     previous_deployment_id, duration_ms, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE
            SET build_id = EXCLUDED.build_id,
                status = EXCLUDED.status,
                deployment_url = EXCLUDED.deployment_url,
                deploy_log = EXCLUDED.deploy_log,
                error_message = EXCLUDED.error_message,
                previous_deployment_id = EXCLUDED.previous_deployment_id,
                duration_ms = EXCLUDED.duration_ms,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(deployment.id)
        .bind(deployment.project_id)
        .bind(deployment.build_id)
        .bind(&deployment.strategy)
        .bind(deployment.environment.as_str())
        .bind(deployment.status.as_str())
        .bind(&deployment.manifest)
        .bind(&deployment.deployment_url)
        .bind(&deployment.deploy_log)
        .bind(&deployment.error_message)
        .bind(deployment.previous_deployment_id)
        .bind(deployment.duration_ms)
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    project_id: Uuid,
    build_id: Option<Uuid>,
    strategy: String,
    environment: String,
    status: String,
    manifest: Option<String>,
    deployment_url: Option<String>,
    deploy_log: String,
    error_message: Option<String>,
    previous_deployment_id: Option<Uuid>,
    duration_ms: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeploymentRow> for DeploymentJob {
    type Error = RepositoryError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(DeploymentJob {
            id: row.id,
            project_id: row.project_id,
            build_id: row.build_id,
            // kept verbatim; the strategy registry decides how to read it
            strategy: row.strategy,
            environment: parse_column(&row.environment, row.id)?,
            status: parse_column(&row.status, row.id)?,
            manifest: row.manifest,
            deployment_url: row.deployment_url,
            deploy_log: row.deploy_log,
            error_message: row.error_message,
            previous_deployment_id: row.previous_deployment_id,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfforge_core::domain::deployment::DeployStatus;

    fn row(strategy: &str, environment: &str) -> DeploymentRow {
        let now = Utc::now();
        DeploymentRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            build_id: None,
            strategy: strategy.to_string(),
            environment: environment.to_string(),
            status: "ROLLED_BACK".to_string(),
            manifest: None,
            deployment_url: None,
            deploy_log: String::new(),
            error_message: None,
            previous_deployment_id: Some(Uuid::new_v4()),
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unknown_strategy_survives_conversion() {
        let job = DeploymentJob::try_from(row("recreate", "PRODUCTION")).unwrap();
        assert_eq!(job.strategy, "recreate");
        assert_eq!(job.environment, DeployEnvironment::Production);
        assert_eq!(job.status, DeployStatus::RolledBack);
        assert!(job.previous_deployment_id.is_some());
    }

    #[test]
    fn test_unknown_environment_is_invalid_record() {
        assert!(DeploymentJob::try_from(row("ROLLING", "qa")).is_err());
    }
}
