//! Blue-green deployment
//!
//! The new version ("green") is pushed beside the live one ("blue") without
//! a route, verified, and only then given the production route. Blue is
//! retired afterwards and green takes over its name.

use async_trait::async_trait;
use cfforge_core::domain::deployment::StrategyKind;
use std::sync::Arc;

use super::cf::CfCli;
use super::{DeployContext, DeployStrategy};
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::CommandRunner;

pub struct BlueGreenStrategy {
    cf: CfCli,
    health_url: String,
}

impl BlueGreenStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, health_url: impl Into<String>) -> Self {
        Self {
            cf: CfCli::new(runner),
            health_url: health_url.into(),
        }
    }

    fn green_name(ctx: &DeployContext) -> String {
        format!("{}-green", ctx.app_name)
    }
}

#[async_trait]
impl DeployStrategy for BlueGreenStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BlueGreen
    }

    async fn deploy(&self, ctx: &DeployContext, log: &StepLog) -> Result<String, EngineError> {
        let app = ctx.app_name.as_str();
        let green = Self::green_name(ctx);
        let domain = ctx.domain.as_str();

        log.info(format!("[1/4] Pushing green instance {}", green));
        self.cf.push(ctx, log, &green, &["--no-route"]).await?;

        log.info(format!("[2/4] Verifying health of {}", green));
        if !self.cf.healthy(ctx, log, &green, &self.health_url).await? {
            return Err(EngineError::HealthCheck(format!(
                "Green instance {} failed health verification",
                green
            )));
        }

        log.info(format!("[3/4] Switching route {}.{} to {}", app, domain, green));
        self.cf
            .run(ctx, log, &["map-route", &green, domain, "--hostname", app])
            .await?;

        log.info(format!("[4/4] Replacing blue instance {} with {}", app, green));
        self.cf.cut_over(ctx, log, &green).await?;

        Ok(ctx.url())
    }

    async fn rollback(&self, ctx: &DeployContext, log: &StepLog) -> Result<(), EngineError> {
        let green = Self::green_name(ctx);
        if !self.cf.app_exists(ctx, log, &green).await? {
            log.info(format!("Green instance {} already removed", green));
            return Ok(());
        }
        log.info(format!("Deleting green instance {}", green));
        self.cf.run(ctx, log, &["delete", &green, "-f"]).await?;
        Ok(())
    }
}
