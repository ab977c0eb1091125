//! Deploy strategy trait

use async_trait::async_trait;
use cfforge_core::domain::deployment::StrategyKind;
use std::time::Instant;
use tracing::{info, warn};

use super::{DeployContext, DeployResult};
use crate::error::EngineError;
use crate::log_buffer::StepLog;

#[async_trait]
pub trait DeployStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Runs the deployment protocol, returning the application URL
    async fn deploy(&self, ctx: &DeployContext, log: &StepLog) -> Result<String, EngineError>;

    /// Undoes whatever a partial [`DeployStrategy::deploy`] left behind
    ///
    /// Must be safe to call more than once.
    async fn rollback(&self, ctx: &DeployContext, log: &StepLog) -> Result<(), EngineError>;

    /// Deploys, rolling back on failure
    ///
    /// Never returns an error: failures become a `FAILED` result whose log
    /// records the rollback attempt. A cutover that already retired the old
    /// instance is not rolled back. A failing rollback is logged and does
    /// not replace the original error.
    async fn execute(&self, ctx: &DeployContext) -> DeployResult {
        let started = Instant::now();
        let log = StepLog::new();
        info!(
            deployment_id = %ctx.deployment_id,
            app = %ctx.app_name,
            "Starting {} deployment",
            self.kind()
        );

        match self.deploy(ctx, &log).await {
            Ok(url) => {
                log.info(format!("Deployment successful: {}", url));
                DeployResult::deployed(url, log.render(), started.elapsed().as_millis() as i64)
            }
            Err(e) => {
                warn!(deployment_id = %ctx.deployment_id, "{} deployment failed: {}", self.kind(), e);
                log.error(format!("Deployment failed: {}", e));
                if let EngineError::CutoverIncomplete { successor, .. } = &e {
                    log.warn(format!("Rollback skipped: {} is the only serving instance", successor));
                    return DeployResult::failed(
                        e.to_string(),
                        log.render(),
                        started.elapsed().as_millis() as i64,
                    );
                }
                log.info("Initiating rollback...");
                match self.rollback(ctx, &log).await {
                    Ok(()) => log.info("Rollback complete"),
                    Err(rollback_error) => {
                        warn!(
                            deployment_id = %ctx.deployment_id,
                            "Rollback failed: {}", rollback_error
                        );
                        log.warn(format!("Rollback failed: {}", rollback_error));
                    }
                }
                DeployResult::failed(
                    e.to_string(),
                    log.render(),
                    started.elapsed().as_millis() as i64,
                )
            }
        }
    }
}
