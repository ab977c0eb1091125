//! Deploy dispatcher
//!
//! Consumes deploy requests for the latest pending deployment of a project,
//! stages the originating build's artifact and hands it to the selected
//! strategy. Also owns the explicit rollback action and the multi-target
//! entry point.

use cfforge_core::domain::TransitionError;
use cfforge_core::domain::deployment::{DeployStatus, DeploymentJob, StrategyKind};
use cfforge_core::domain::project::Project;
use cfforge_core::dto::deploy::{DeployRequest, MultiDeployRequest};
use cfforge_core::dto::metric::{self, MetricEvent};
use cfforge_core::storage::artifact_extension;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::fanout::{MultiTargetDeployer, PlatformCredentials};
use super::registry::{ResolvedStrategy, StrategyRegistry};
use super::{DeployContext, DeployResult};
use crate::Collaborators;
use crate::error::EngineError;
use crate::events::emit;
use crate::locks::ProjectLocks;
use crate::log_buffer::StepLog;

#[derive(Debug, Clone)]
pub struct DeployDispatcherConfig {
    /// Worker identity, used as the `source` of metric events
    pub source: String,
    /// Parent directory of per-deployment staging directories
    pub workspace_base: PathBuf,
    /// Routing domain of the default foundation
    pub apps_domain: String,
    /// Strategy used when a deployment names an unknown one
    pub default_strategy: StrategyKind,
}

pub struct DeployDispatcher {
    config: DeployDispatcherConfig,
    registry: StrategyRegistry,
    fanout: MultiTargetDeployer,
    services: Collaborators,
    locks: ProjectLocks,
}

impl DeployDispatcher {
    pub fn new(
        config: DeployDispatcherConfig,
        registry: StrategyRegistry,
        services: Collaborators,
        credentials: Option<PlatformCredentials>,
    ) -> Self {
        let fanout = MultiTargetDeployer::new(
            services.runner.clone(),
            services.projects.clone(),
            credentials,
        );
        Self {
            config,
            registry,
            fanout,
            services,
            locks: ProjectLocks::new(),
        }
    }

    fn staging_dir(&self, name: String) -> PathBuf {
        self.config.workspace_base.join(name)
    }

    async fn find_project(&self, project_id: Uuid) -> Result<Project, EngineError> {
        self.services
            .projects
            .find_project(project_id)
            .await?
            .ok_or(EngineError::ProjectNotFound(project_id))
    }

    fn resolve_strategy(&self, name: &str, log: &StepLog) -> Result<ResolvedStrategy, EngineError> {
        let resolved = self.registry.resolve(name, self.config.default_strategy)?;
        if let Some(requested) = &resolved.fallback_from {
            warn!(
                "Unknown deploy strategy '{}', falling back to {}",
                requested,
                resolved.strategy.kind()
            );
            log.warn(format!(
                "Unknown deploy strategy '{}', using {}",
                requested,
                resolved.strategy.kind()
            ));
        }
        Ok(resolved)
    }

    fn base_context(
        &self,
        project: &Project,
        job: &DeploymentJob,
        staging_dir: &Path,
        artifact: Option<PathBuf>,
    ) -> DeployContext {
        DeployContext {
            project_id: project.id,
            deployment_id: job.id,
            app_name: project.slug.clone(),
            environment: job.environment,
            domain: self.config.apps_domain.clone(),
            artifact,
            manifest: job.manifest.clone().or_else(|| project.manifest.clone()),
            env_vars: project
                .env_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            staging_dir: staging_dir.to_path_buf(),
            platform_env: Vec::new(),
        }
    }

    /// Downloads the artifact of `build_id` (or the latest successful build)
    async fn stage_artifact(
        &self,
        project_id: Uuid,
        build_id: Option<Uuid>,
        staging_dir: &Path,
        log: &StepLog,
    ) -> Result<PathBuf, EngineError> {
        let build = match build_id {
            Some(id) => self
                .services
                .builds
                .find_build(id)
                .await?
                .ok_or(EngineError::BuildNotFound(id))?,
            None => self
                .services
                .builds
                .latest_successful_build(project_id)
                .await?
                .ok_or_else(|| {
                    EngineError::MissingArtifact(format!(
                        "project {} has no successful build",
                        project_id
                    ))
                })?,
        };

        let key = build.artifact_key.ok_or_else(|| {
            EngineError::MissingArtifact(format!("build {} has no artifact", build.id))
        })?;
        let content = self.services.store.get_object(&key).await?;

        let file_name = match artifact_extension(&key) {
            Some(ext) => format!("artifact.{}", ext),
            None => "artifact".to_string(),
        };
        tokio::fs::create_dir_all(staging_dir)
            .await
            .map_err(|e| EngineError::io("Failed to create staging directory", e))?;
        let path = staging_dir.join(file_name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| EngineError::io("Failed to stage artifact", e))?;

        log.info(format!("Staged artifact {}", key));
        Ok(path)
    }

    async fn remove_staging(dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staging directory {}: {}", dir.display(), e);
            }
        }
    }

    /// Handles one deploy request
    ///
    /// Returns the job as persisted. A request whose latest deployment is
    /// already terminal is acknowledged without running anything.
    pub async fn handle(&self, request: &DeployRequest) -> Result<DeploymentJob, EngineError> {
        let project_id = request.project_id;
        let _guard = self.locks.acquire(project_id).await;

        let mut job = self
            .services
            .deployments
            .latest_deployment(project_id)
            .await?
            .ok_or(EngineError::NoDeploymentJob(project_id))?;

        if job.status.is_terminal() {
            info!(
                %project_id,
                deployment_id = %job.id,
                "Deployment already {}, ignoring redelivered request",
                job.status
            );
            return Ok(job);
        }

        if job.environment != request.environment {
            warn!(
                deployment_id = %job.id,
                "Request targets {} but deployment was created for {}",
                request.environment,
                job.environment
            );
            job.environment = request.environment;
        }

        let started = Instant::now();
        job.transition(DeployStatus::InProgress)?;
        job.previous_deployment_id = self
            .services
            .deployments
            .last_deployed(project_id, job.environment, job.id)
            .await?
            .map(|previous| previous.id);
        self.services.deployments.save_deployment(&job).await?;
        info!(%project_id, deployment_id = %job.id, strategy = %job.strategy, "Deployment started");

        let log = StepLog::new();
        let staging_dir = self.staging_dir(format!("cfforge-deploy-{}", job.id));
        let outcome = AssertUnwindSafe(self.run_deployment(&job, &staging_dir, &log))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::from_panic(panic)));
        Self::remove_staging(&staging_dir).await;

        let duration_ms = started.elapsed().as_millis() as i64;
        let event = self.finalize(&mut job, outcome, &log, duration_ms);

        self.services.deployments.save_deployment(&job).await?;
        emit(self.services.events.as_ref(), event).await;

        info!(
            %project_id,
            deployment_id = %job.id,
            status = %job.status,
            duration_ms,
            "Deployment finished"
        );
        Ok(job)
    }

    async fn run_deployment(
        &self,
        job: &DeploymentJob,
        staging_dir: &Path,
        log: &StepLog,
    ) -> Result<DeployResult, EngineError> {
        let project = self.find_project(job.project_id).await?;
        let resolved = self.resolve_strategy(&job.strategy, log)?;

        let artifact = self
            .stage_artifact(project.id, job.build_id, staging_dir, log)
            .await?;
        let ctx = self.base_context(&project, job, staging_dir, Some(artifact));

        log.info(format!(
            "Deploying {} to {} with {} strategy",
            ctx.app_name,
            ctx.environment,
            resolved.strategy.kind()
        ));
        Ok(resolved.strategy.execute(&ctx).await)
    }

    fn finalize(
        &self,
        job: &mut DeploymentJob,
        outcome: Result<DeployResult, EngineError>,
        log: &StepLog,
        duration_ms: i64,
    ) -> MetricEvent {
        let source = self.config.source.clone();

        let (status, event) = match outcome {
            Ok(result) => {
                log.append_rendered(&result.log);
                job.deployment_url = result.deployment_url;
                job.error_message = result.error_message.clone();
                let event = match result.error_message {
                    None => MetricEvent::success(
                        metric::DEPLOY_COMPLETED,
                        source,
                        job.project_id,
                        duration_ms,
                    ),
                    Some(message) => MetricEvent::failure(
                        metric::DEPLOY_FAILED,
                        source,
                        job.project_id,
                        duration_ms,
                        message,
                    ),
                };
                (result.status, event)
            }
            Err(e) => {
                error!(deployment_id = %job.id, "Deployment failed before completion: {}", e);
                log.error(e.to_string());
                job.error_message = Some(e.to_string());
                (
                    DeployStatus::Failed,
                    MetricEvent::failure(
                        metric::DEPLOY_FAILED,
                        source,
                        job.project_id,
                        duration_ms,
                        e.to_string(),
                    ),
                )
            }
        };

        if let Err(e) = job.transition(status) {
            error!(deployment_id = %job.id, "{}", e);
            job.status = status;
        }
        job.deploy_log = log.render();
        job.duration_ms = Some(duration_ms);

        event
            .with_dimension("deployment_id", job.id.to_string())
            .with_dimension("strategy", job.strategy.clone())
            .with_dimension("environment", job.environment.as_str())
    }

    /// Rolls back a finished deployment
    ///
    /// Allowed from `DEPLOYED` and `FAILED` only. The strategy's rollback
    /// runs first; a `DEPLOYED` job that recorded a previous successful
    /// deployment then has that deployment's artifact pushed again.
    pub async fn rollback_deployment(
        &self,
        deployment_id: Uuid,
    ) -> Result<DeploymentJob, EngineError> {
        let project_id = self
            .services
            .deployments
            .find_deployment(deployment_id)
            .await?
            .ok_or(EngineError::DeploymentNotFound(deployment_id))?
            .project_id;
        let _guard = self.locks.acquire(project_id).await;

        // reload under the lock
        let mut job = self
            .services
            .deployments
            .find_deployment(deployment_id)
            .await?
            .ok_or(EngineError::DeploymentNotFound(deployment_id))?;

        if !job.status.can_transition_to(DeployStatus::RolledBack) {
            return Err(TransitionError {
                entity: "deployment",
                from: job.status.to_string(),
                to: DeployStatus::RolledBack.to_string(),
            }
            .into());
        }

        let started = Instant::now();
        let log = StepLog::new();
        log.info(format!(
            "Rollback of deployment {} requested (status {})",
            job.id, job.status
        ));

        let staging_dir = self.staging_dir(format!("cfforge-rollback-{}", job.id));
        let outcome = AssertUnwindSafe(self.run_rollback(&job, &staging_dir, &log))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::from_panic(panic)));
        Self::remove_staging(&staging_dir).await;

        let restored_url = match outcome {
            Ok(url) => url,
            Err(e) => {
                error!(deployment_id = %job.id, "Rollback failed: {}", e);
                log.error(format!("Rollback failed: {}", e));
                job.deploy_log.push_str(&log.render());
                self.services.deployments.save_deployment(&job).await?;
                return Err(e);
            }
        };

        job.transition(DeployStatus::RolledBack)?;
        if restored_url.is_some() {
            job.deployment_url = restored_url;
        }
        log.info("Rollback complete");
        job.deploy_log.push_str(&log.render());
        self.services.deployments.save_deployment(&job).await?;

        let duration_ms = started.elapsed().as_millis() as i64;
        emit(
            self.services.events.as_ref(),
            MetricEvent::success(
                metric::DEPLOY_ROLLED_BACK,
                self.config.source.clone(),
                job.project_id,
                duration_ms,
            )
            .with_dimension("deployment_id", job.id.to_string())
            .with_dimension("strategy", job.strategy.clone())
            .with_dimension("environment", job.environment.as_str()),
        )
        .await;

        info!(deployment_id = %job.id, "Deployment rolled back");
        Ok(job)
    }

    /// Returns the URL of the restored deployment, if one was restored
    async fn run_rollback(
        &self,
        job: &DeploymentJob,
        staging_dir: &Path,
        log: &StepLog,
    ) -> Result<Option<String>, EngineError> {
        let project = self.find_project(job.project_id).await?;
        let resolved = self.resolve_strategy(&job.strategy, log)?;
        let mut ctx = self.base_context(&project, job, staging_dir, None);

        resolved.strategy.rollback(&ctx, log).await?;

        if job.status != DeployStatus::Deployed {
            return Ok(None);
        }
        let Some(previous_id) = job.previous_deployment_id else {
            log.warn("No previous successful deployment to restore");
            return Ok(None);
        };

        let previous = self
            .services
            .deployments
            .find_deployment(previous_id)
            .await?
            .ok_or(EngineError::DeploymentNotFound(previous_id))?;
        log.info(format!("Restoring deployment {}", previous.id));

        ctx.artifact = Some(
            self.stage_artifact(project.id, previous.build_id, staging_dir, log)
                .await?,
        );
        ctx.manifest = previous.manifest.clone().or_else(|| project.manifest.clone());

        let rolling = self.registry.get(StrategyKind::Rolling)?;
        let result = rolling.execute(&ctx).await;
        log.append_rendered(&result.log);

        match result.status {
            DeployStatus::Deployed => Ok(result.deployment_url.or(previous.deployment_url)),
            _ => Err(EngineError::Restore(
                result
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    /// Deploys a build of a project to several targets at once
    ///
    /// Nothing is persisted; the result map is the only record. Each target
    /// publishes its own metric event.
    pub async fn deploy_to_targets(
        &self,
        project_id: Uuid,
        request: &MultiDeployRequest,
    ) -> Result<HashMap<Uuid, DeployResult>, EngineError> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.find_project(project_id).await?;
        let log = StepLog::new();
        let strategy_name = request
            .strategy
            .clone()
            .unwrap_or_else(|| self.config.default_strategy.as_str().to_string());
        let resolved = self.resolve_strategy(&strategy_name, &log)?;

        let fanout_id = Uuid::new_v4();
        let staging_dir = self.staging_dir(format!("cfforge-multi-{}", fanout_id));
        let artifact = match self
            .stage_artifact(project_id, request.build_id, &staging_dir, &log)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                Self::remove_staging(&staging_dir).await;
                return Err(e);
            }
        };

        let mut job = DeploymentJob::pending(
            project_id,
            request.build_id,
            strategy_name,
            request.environment,
        );
        job.id = fanout_id;
        let base = self.base_context(&project, &job, &staging_dir, Some(artifact));

        let started = Instant::now();
        let results = self
            .fanout
            .deploy_to_targets(&base, &request.target_ids, resolved.strategy.clone())
            .await;
        Self::remove_staging(&staging_dir).await;

        for (target_id, result) in &results {
            let event = match &result.error_message {
                None => MetricEvent::success(
                    metric::DEPLOY_COMPLETED,
                    self.config.source.clone(),
                    project_id,
                    result.duration_ms,
                ),
                Some(message) => MetricEvent::failure(
                    metric::DEPLOY_FAILED,
                    self.config.source.clone(),
                    project_id,
                    result.duration_ms,
                    message.clone(),
                ),
            };
            emit(
                self.services.events.as_ref(),
                event
                    .with_dimension("target_id", target_id.to_string())
                    .with_dimension("strategy", resolved.strategy.kind().as_str())
                    .with_dimension("environment", request.environment.as_str()),
            )
            .await;
        }

        info!(
            %project_id,
            targets = results.len(),
            failed = results.values().filter(|r| r.status == DeployStatus::Failed).count(),
            duration_ms = started.elapsed().as_millis() as i64,
            "Multi-target deployment finished"
        );
        Ok(results)
    }
}
