//! Multi-target fan-out
//!
//! Replicates one deployment across several foundations concurrently. Each
//! target gets its own `cf` session directory, so the CLI state of one
//! target never leaks into another, and a failing target never cancels its
//! siblings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::cf::CfCli;
use super::{DeployContext, DeployResult, DeployStrategy};
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::CommandRunner;
use crate::repository::ProjectRepository;
use cfforge_core::domain::project::DeployTarget;

/// Credentials for `cf auth`, passed to the CLI through its environment
#[derive(Clone)]
pub struct PlatformCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct MultiTargetDeployer {
    cf: CfCli,
    projects: Arc<dyn ProjectRepository>,
    credentials: Option<PlatformCredentials>,
}

impl MultiTargetDeployer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        projects: Arc<dyn ProjectRepository>,
        credentials: Option<PlatformCredentials>,
    ) -> Self {
        Self {
            cf: CfCli::new(runner),
            projects,
            credentials,
        }
    }

    /// Deploys `base` to every target concurrently
    ///
    /// The map has one entry per distinct target id. Unknown targets and
    /// crashed tasks are reported as `FAILED` entries.
    pub async fn deploy_to_targets(
        &self,
        base: &DeployContext,
        target_ids: &[Uuid],
        strategy: Arc<dyn DeployStrategy>,
    ) -> HashMap<Uuid, DeployResult> {
        info!(
            project_id = %base.project_id,
            targets = target_ids.len(),
            "Fanning out {} deployment",
            strategy.kind()
        );

        // a target listed twice is deployed once; both runs would share its session directory
        let mut seen = HashSet::with_capacity(target_ids.len());
        let handles: Vec<(Uuid, JoinHandle<DeployResult>)> = target_ids
            .iter()
            .filter(|&&target_id| seen.insert(target_id))
            .map(|&target_id| {
                let deployer = self.clone();
                let base = base.clone();
                let strategy = strategy.clone();
                let handle = tokio::spawn(async move {
                    deployer.deploy_to_target(base, target_id, strategy).await
                });
                (target_id, handle)
            })
            .collect();

        let mut results = HashMap::with_capacity(handles.len());
        for (target_id, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                error!(%target_id, "Deployment task crashed: {}", e);
                DeployResult::failed(format!("Deployment task failed: {}", e), String::new(), 0)
            });
            results.insert(target_id, result);
        }
        results
    }

    async fn deploy_to_target(
        &self,
        base: DeployContext,
        target_id: Uuid,
        strategy: Arc<dyn DeployStrategy>,
    ) -> DeployResult {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as i64;

        let target = match self.projects.find_target(target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                return DeployResult::failed(
                    format!("Target not found: {}", target_id),
                    String::new(),
                    elapsed(),
                );
            }
            Err(e) => return DeployResult::failed(e.to_string(), String::new(), elapsed()),
        };

        let staging_dir = base.staging_dir.join(format!("target-{}", target_id));
        let cf_home = staging_dir.join("cf-home");
        if let Err(e) = tokio::fs::create_dir_all(&cf_home).await {
            return DeployResult::failed(
                format!("Failed to prepare session directory: {}", e),
                String::new(),
                elapsed(),
            );
        }

        let mut ctx = base;
        ctx.domain = target.apps_domain();
        ctx.staging_dir = staging_dir;
        ctx.platform_env = vec![("CF_HOME".to_string(), cf_home.display().to_string())];

        let session_log = StepLog::new();
        session_log.info(format!(
            "Target {}: {} (org {}, space {})",
            target_id, target.api_endpoint, target.org_name, target.space_name
        ));
        if let Err(e) = self.connect(&ctx, &target, &session_log).await {
            error!(%target_id, "Failed to open platform session: {}", e);
            session_log.error(e.to_string());
            return DeployResult::failed(e.to_string(), session_log.render(), elapsed());
        }

        let mut result = strategy.execute(&ctx).await;
        result.log = format!("{}{}", session_log.render(), result.log);
        result.duration_ms = elapsed();
        info!(%target_id, status = %result.status, "Target deployment finished");
        result
    }

    /// `cf api`, `cf auth`, `cf target` inside the target's `CF_HOME`
    async fn connect(
        &self,
        ctx: &DeployContext,
        target: &DeployTarget,
        log: &StepLog,
    ) -> Result<(), EngineError> {
        self.cf
            .run(ctx, log, &["api", target.api_endpoint.as_str()])
            .await?;

        if let Some(credentials) = &self.credentials {
            let auth = self
                .cf
                .command(ctx, ["auth"])
                .env("CF_USERNAME", credentials.username.as_str())
                .env("CF_PASSWORD", credentials.password.as_str());
            self.cf.exec(&auth, log).await?;
        }

        self.cf
            .run(
                ctx,
                log,
                &["target", "-o", target.org_name.as_str(), "-s", target.space_name.as_str()],
            )
            .await?;
        Ok(())
    }
}
