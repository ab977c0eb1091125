use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Projects and targets are owned by the API service; created here so a
    // worker can run against an empty database
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            slug VARCHAR(255) NOT NULL,
            language VARCHAR(50) NOT NULL,
            framework VARCHAR(255),
            manifest TEXT,
            env_vars JSONB NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cf_targets (
            id UUID PRIMARY KEY,
            api_endpoint VARCHAR(512) NOT NULL,
            org_name VARCHAR(255) NOT NULL,
            space_name VARCHAR(255) NOT NULL,
            is_default BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS builds (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            trigger_type VARCHAR(50) NOT NULL,
            status VARCHAR(50) NOT NULL,
            build_log TEXT NOT NULL DEFAULT '',
            artifact_key VARCHAR(1024),
            sbom_key VARCHAR(1024),
            vulnerability_report JSONB,
            error_message TEXT,
            duration_ms BIGINT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            build_id UUID REFERENCES builds(id) ON DELETE SET NULL,
            strategy VARCHAR(50) NOT NULL,
            environment VARCHAR(50) NOT NULL,
            status VARCHAR(50) NOT NULL,
            manifest TEXT,
            deployment_url VARCHAR(1024),
            deploy_log TEXT NOT NULL DEFAULT '',
            error_message TEXT,
            previous_deployment_id UUID,
            duration_ms BIGINT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_builds_project_created ON builds(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_builds_status ON builds(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_project_created ON deployments(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_project_env_status ON deployments(project_id, environment, status)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
