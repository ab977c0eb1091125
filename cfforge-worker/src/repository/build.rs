//! Build repository

use async_trait::async_trait;
use cfforge_core::domain::build::BuildJob;
use cfforge_core::domain::vulnerability::VulnerabilityReport;
use cfforge_engine::error::RepositoryError;
use cfforge_engine::repository::BuildRepository;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{PgRepository, backend, parse_column};

const SELECT_BUILD: &str = r#"
    SELECT id, project_id, trigger_type, status, build_log, artifact_key, sbom_key,
           vulnerability_report, error_message, duration_ms, created_at, updated_at
    FROM builds
"#;

#[async_trait]
impl BuildRepository for PgRepository {
    async fn latest_build(&self, project_id: Uuid) -> Result<Option<BuildJob>, RepositoryError> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "{SELECT_BUILD} WHERE project_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(BuildJob::try_from).transpose()
    }

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildJob>, RepositoryError> {
        let row = sqlx::query_as::<_, BuildRow>(&format!("{SELECT_BUILD} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(BuildJob::try_from).transpose()
    }

    async fn latest_successful_build(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BuildJob>, RepositoryError> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "{SELECT_BUILD} WHERE project_id = $1 AND status = 'SUCCESS' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(BuildJob::try_from).transpose()
    }

    async fn save_build(&self, build: &BuildJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO builds (id, project_id, trigger_type, status, build_log, artifact_key,
                                sbom_key, vulnerability_report, error_message, duration_ms,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                build_log = EXCLUDED.build_log,
                artifact_key = EXCLUDED.artifact_key,
                sbom_key = EXCLUDED.sbom_key,
                vulnerability_report = EXCLUDED.vulnerability_report,
                error_message = EXCLUDED.error_message,
                duration_ms = EXCLUDED.duration_ms,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(build.id)
        .bind(build.project_id)
        .bind(build.trigger_type.as_str())
        .bind(build.status.as_str())
        .bind(&build.build_log)
        .bind(&build.artifact_key)
        .bind(&build.sbom_key)
        .bind(build.vulnerability_report.as_ref().map(Json))
        .bind(&build.error_message)
        .bind(build.duration_ms)
        .bind(build.created_at)
        .bind(build.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: Uuid,
    project_id: Uuid,
    trigger_type: String,
    status: String,
    build_log: String,
    artifact_key: Option<String>,
    sbom_key: Option<String>,
    vulnerability_report: Option<Json<VulnerabilityReport>>,
    error_message: Option<String>,
    duration_ms: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BuildRow> for BuildJob {
    type Error = RepositoryError;

    fn try_from(row: BuildRow) -> Result<Self, Self::Error> {
        Ok(BuildJob {
            id: row.id,
            project_id: row.project_id,
            trigger_type: parse_column(&row.trigger_type, row.id)?,
            status: parse_column(&row.status, row.id)?,
            build_log: row.build_log,
            artifact_key: row.artifact_key,
            sbom_key: row.sbom_key,
            vulnerability_report: row.vulnerability_report.map(|Json(report)| report),
            error_message: row.error_message,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfforge_core::domain::build::{BuildStatus, TriggerType};

    fn row(status: &str) -> BuildRow {
        let now = Utc::now();
        BuildRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            trigger_type: "AGENT".to_string(),
            status: status.to_string(),
            build_log: "[1/1] go build".to_string(),
            artifact_key: Some("artifacts/p/b".to_string()),
            sbom_key: None,
            vulnerability_report: Some(Json(VulnerabilityReport::not_scanned("disabled"))),
            error_message: None,
            duration_ms: Some(1200),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_converts_to_build_job() {
        let job = BuildJob::try_from(row("SUCCESS")).unwrap();
        assert_eq!(job.status, BuildStatus::Success);
        assert_eq!(job.trigger_type, TriggerType::Agent);
        assert_eq!(job.duration_ms, Some(1200));
        assert!(!job.vulnerability_report.unwrap().scanned);
    }

    #[test]
    fn test_unknown_status_is_invalid_record() {
        let err = BuildJob::try_from(row("DONE")).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRecord(_)));
    }
}
