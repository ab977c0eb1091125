//! Canary deployment
//!
//! A single canary instance is pushed and attached to the production route
//! so it takes a share of live traffic. Once it proves healthy it is scaled
//! up and takes over the application's name; otherwise it is removed and
//! the live version is untouched.

use async_trait::async_trait;
use cfforge_core::domain::deployment::StrategyKind;
use std::sync::Arc;
use std::time::Duration;

use super::cf::CfCli;
use super::{DeployContext, DeployStrategy};
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::CommandRunner;

/// How long the canary gets before it must be healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationPolicy {
    /// Wait once, then probe once
    FixedDelay(Duration),
    /// Probe every `interval` until healthy, at most `max_attempts` times
    Poll {
        interval: Duration,
        max_attempts: u32,
    },
}

#[derive(Debug, Clone)]
pub struct CanaryConfig {
    pub stabilization: StabilizationPolicy,
    /// Instance count the canary is scaled to once healthy
    pub promote_instances: u32,
    /// Pause after scaling before the old version is removed
    pub promote_wait: Duration,
    pub health_url: String,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            stabilization: StabilizationPolicy::FixedDelay(Duration::from_secs(15)),
            promote_instances: 2,
            promote_wait: Duration::from_secs(10),
            health_url: "http://localhost:8080/actuator/health".to_string(),
        }
    }
}

pub struct CanaryStrategy {
    cf: CfCli,
    config: CanaryConfig,
}

impl CanaryStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, config: CanaryConfig) -> Self {
        Self {
            cf: CfCli::new(runner),
            config,
        }
    }

    fn canary_name(ctx: &DeployContext) -> String {
        format!("{}-canary", ctx.app_name)
    }

    async fn stabilize(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        canary: &str,
    ) -> Result<bool, EngineError> {
        let health_url = self.config.health_url.as_str();
        match self.config.stabilization {
            StabilizationPolicy::FixedDelay(delay) => {
                log.info(format!(
                    "Waiting {}s for the canary to stabilize",
                    delay.as_secs()
                ));
                tokio::time::sleep(delay).await;
                self.cf.healthy(ctx, log, canary, health_url).await
            }
            StabilizationPolicy::Poll {
                interval,
                max_attempts,
            } => {
                for attempt in 1..=max_attempts {
                    tokio::time::sleep(interval).await;
                    if self.cf.healthy(ctx, log, canary, health_url).await? {
                        return Ok(true);
                    }
                    log.info(format!(
                        "Canary not healthy yet (attempt {}/{})",
                        attempt, max_attempts
                    ));
                }
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl DeployStrategy for CanaryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Canary
    }

    async fn deploy(&self, ctx: &DeployContext, log: &StepLog) -> Result<String, EngineError> {
        let app = ctx.app_name.as_str();
        let canary = Self::canary_name(ctx);
        let domain = ctx.domain.as_str();

        log.info(format!("[1/5] Pushing canary {} with 1 instance", canary));
        self.cf
            .push(ctx, log, &canary, &["-i", "1", "--no-route"])
            .await?;

        log.info(format!("[2/5] Routing traffic for {}.{} to the canary", app, domain));
        self.cf
            .run(ctx, log, &["map-route", &canary, domain, "--hostname", app])
            .await?;

        log.info("[3/5] Validating canary health");
        if !self.stabilize(ctx, log, &canary).await? {
            log.error("Canary health check FAILED");
            return Err(EngineError::HealthCheck("Canary health check failed".to_string()));
        }
        log.info("Canary health check passed");

        let instances = self.config.promote_instances.to_string();
        log.info(format!("[4/5] Scaling canary to {} instances", instances));
        self.cf
            .run(ctx, log, &["scale", &canary, "-i", &instances])
            .await?;
        tokio::time::sleep(self.config.promote_wait).await;

        log.info(format!("[5/5] Replacing {} with the canary", app));
        self.cf.cut_over(ctx, log, &canary).await?;

        Ok(ctx.url())
    }

    /// Detaches the canary from the shared route, then deletes it
    ///
    /// The route itself is never deleted: the live version still serves it.
    async fn rollback(&self, ctx: &DeployContext, log: &StepLog) -> Result<(), EngineError> {
        let app = ctx.app_name.as_str();
        let canary = Self::canary_name(ctx);
        if !self.cf.app_exists(ctx, log, &canary).await? {
            log.info(format!("Canary {} already removed", canary));
            return Ok(());
        }
        log.info(format!("Removing canary {}", canary));

        let unmapped = self
            .cf
            .run(ctx, log, &["unmap-route", &canary, &ctx.domain, "--hostname", app])
            .await;
        let deleted = self.cf.run(ctx, log, &["delete", &canary, "-f"]).await;

        unmapped.and(deleted).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::test_support::context;
    use crate::testing::ScriptedRunner;
    use cfforge_core::domain::deployment::DeployStatus;

    fn config(stabilization: StabilizationPolicy) -> CanaryConfig {
        CanaryConfig {
            stabilization,
            promote_instances: 3,
            promote_wait: Duration::ZERO,
            health_url: "http://localhost:8080/health".to_string(),
        }
    }

    #[tokio::test]
    async fn test_healthy_canary_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let strategy = CanaryStrategy::new(
            runner.clone(),
            config(StabilizationPolicy::FixedDelay(Duration::ZERO)),
        );

        let result = strategy.execute(&context(dir.path())).await;

        assert_eq!(result.status, DeployStatus::Deployed);
        assert_eq!(result.deployment_url.as_deref(), Some("https://shop.apps.example.com"));
        let push = runner.position("cf push shop-canary").unwrap();
        let scale = runner.position("cf scale shop-canary -i 3").unwrap();
        let rename = runner.position("cf rename shop-canary shop").unwrap();
        assert!(push < scale && scale < rename);
        assert!(runner.command_lines()[push].ends_with("-i 1 --no-route"));
    }

    #[tokio::test]
    async fn test_unhealthy_canary_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("cf ssh shop-canary", 22, "curl: (22) The requested URL returned error: 500");
        let strategy = CanaryStrategy::new(
            runner.clone(),
            config(StabilizationPolicy::FixedDelay(Duration::ZERO)),
        );

        let result = strategy.execute(&context(dir.path())).await;

        assert_eq!(result.status, DeployStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("Canary health check failed"));
        assert!(result.log.contains("Initiating rollback..."));
        assert!(runner.was_called("cf unmap-route shop-canary apps.example.com --hostname shop"));
        assert!(runner.was_called("cf delete shop-canary -f"));
        assert!(!runner.was_called("cf scale"));
        assert!(!runner.was_called("cf delete shop -f"));
        // the shared route is detached from the canary, never deleted
        assert!(!runner.was_called("delete-route"));
    }

    #[tokio::test]
    async fn test_poll_stops_at_first_healthy_probe() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let strategy = CanaryStrategy::new(
            runner.clone(),
            config(StabilizationPolicy::Poll {
                interval: Duration::ZERO,
                max_attempts: 5,
            }),
        );

        let result = strategy.execute(&context(dir.path())).await;

        assert_eq!(result.status, DeployStatus::Deployed);
        let probes = runner
            .command_lines()
            .iter()
            .filter(|c| c.starts_with("cf ssh"))
            .count();
        assert_eq!(probes, 1);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("cf ssh", 1, "");
        let strategy = CanaryStrategy::new(
            runner.clone(),
            config(StabilizationPolicy::Poll {
                interval: Duration::ZERO,
                max_attempts: 3,
            }),
        );

        let result = strategy.execute(&context(dir.path())).await;

        assert_eq!(result.status, DeployStatus::Failed);
        assert!(result.log.contains("Canary not healthy yet (attempt 3/3)"));
        assert!(runner.was_called("cf delete shop-canary -f"));
    }

    #[tokio::test]
    async fn test_rollback_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let strategy = CanaryStrategy::new(runner.clone(), CanaryConfig::default());
        let ctx = context(dir.path());
        let log = StepLog::new();

        strategy.rollback(&ctx, &log).await.unwrap();

        // the platform now reports the canary as gone
        runner.on("cf app shop-canary --guid", 1, "App 'shop-canary' not found");
        runner.on("cf unmap-route shop-canary", 1, "App 'shop-canary' not found");
        runner.on("cf delete shop-canary", 1, "App 'shop-canary' not found");
        strategy.rollback(&ctx, &log).await.unwrap();

        assert_eq!(
            runner
                .command_lines()
                .iter()
                .filter(|c| c.as_str() == "cf delete shop-canary -f")
                .count(),
            1
        );
        assert!(log.render().contains("Canary shop-canary already removed"));
    }

    #[tokio::test]
    async fn test_failed_rename_keeps_canary_serving() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("cf rename shop-canary shop", 1, "Server error");
        let strategy = CanaryStrategy::new(
            runner.clone(),
            config(StabilizationPolicy::FixedDelay(Duration::ZERO)),
        );

        let result = strategy.execute(&context(dir.path())).await;

        assert_eq!(result.status, DeployStatus::Failed);
        assert!(runner.was_called("cf delete shop -f"));
        assert!(!runner.was_called("cf delete shop-canary -f"));
        assert!(!runner.was_called("cf unmap-route shop-canary"));
        assert!(result.error_message.unwrap().starts_with("Cutover to shop-canary incomplete"));
    }
}
