//! Rolling deployment
//!
//! Delegates instance replacement to the platform's native rolling update,
//! which keeps the old instances serving until the new ones are healthy.

use async_trait::async_trait;
use cfforge_core::domain::deployment::StrategyKind;
use std::sync::Arc;

use super::cf::CfCli;
use super::{DeployContext, DeployStrategy};
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::CommandRunner;

pub struct RollingStrategy {
    cf: CfCli,
}

impl RollingStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            cf: CfCli::new(runner),
        }
    }
}

#[async_trait]
impl DeployStrategy for RollingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rolling
    }

    async fn deploy(&self, ctx: &DeployContext, log: &StepLog) -> Result<String, EngineError> {
        let app = ctx.app_name.as_str();

        log.info(format!("[1/2] Pushing {} with rolling strategy", app));
        self.cf.push(ctx, log, app, &["--strategy", "rolling"]).await?;

        log.info(format!("[2/2] Verifying {}", app));
        self.cf.run(ctx, log, &["app", app]).await?;

        Ok(ctx.url())
    }

    async fn rollback(&self, ctx: &DeployContext, log: &StepLog) -> Result<(), EngineError> {
        log.info(format!(
            "Rolling update of {} keeps the previous instances until the new ones start; nothing to undo",
            ctx.app_name
        ));
        Ok(())
    }
}
