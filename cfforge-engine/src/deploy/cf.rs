//! Thin wrapper over the `cf` CLI

use std::path::PathBuf;
use std::sync::Arc;

use super::DeployContext;
use super::manifest::render_manifest;
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::{Command, CommandOutput, CommandRunner};

pub const MANIFEST_FILE: &str = "manifest.yml";

#[derive(Clone)]
pub struct CfCli {
    runner: Arc<dyn CommandRunner>,
}

impl CfCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// A `cf` command running from the staging directory with the context's platform env
    pub fn command<I, S>(&self, ctx: &DeployContext, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new("cf")
            .args(args)
            .current_dir(&ctx.staging_dir)
            .envs(ctx.platform_env.iter().cloned())
    }

    pub async fn exec(&self, command: &Command, log: &StepLog) -> Result<CommandOutput, EngineError> {
        Ok(self.runner.run(command, log).await?)
    }

    pub async fn run(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        args: &[&str],
    ) -> Result<CommandOutput, EngineError> {
        self.exec(&self.command(ctx, args.iter().copied()), log).await
    }

    /// Runs a command whose exit code is an answer rather than a failure
    pub async fn succeeds(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        args: &[&str],
    ) -> Result<bool, EngineError> {
        let output = self
            .runner
            .execute(&self.command(ctx, args.iter().copied()), log)
            .await?;
        Ok(output.success())
    }

    pub async fn app_exists(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        app: &str,
    ) -> Result<bool, EngineError> {
        self.succeeds(ctx, log, &["app", app, "--guid"]).await
    }

    /// Probes `health_url` from inside the application container
    pub async fn healthy(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        app: &str,
        health_url: &str,
    ) -> Result<bool, EngineError> {
        let probe = format!("curl -sf {}", health_url);
        self.succeeds(ctx, log, &["ssh", app, "-c", &probe]).await
    }

    /// Retires the live `ctx.app_name` and renames `successor` to take its place
    ///
    /// `successor` must already be mapped to the production route. Once the
    /// old instance leaves the route, failures are reported as
    /// [`EngineError::CutoverIncomplete`] so the successor is kept.
    pub async fn cut_over(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        successor: &str,
    ) -> Result<(), EngineError> {
        let app = ctx.app_name.as_str();
        let domain = ctx.domain.as_str();

        let retiring = self.app_exists(ctx, log, app).await?;
        if retiring {
            log.info(format!("Retiring {}", app));
            self.run(ctx, log, &["unmap-route", app, domain, "--hostname", app])
                .await?;
        } else {
            log.info(format!("No running {} to retire", app));
        }

        let incomplete = |source: EngineError| {
            log.error(format!(
                "{} now serves {}.{} alone and is kept",
                successor, app, domain
            ));
            EngineError::CutoverIncomplete {
                successor: successor.to_string(),
                source: Box::new(source),
            }
        };

        if retiring {
            self.run(ctx, log, &["delete", app, "-f"])
                .await
                .map_err(&incomplete)?;
        }
        log.info(format!("Renaming {} to {}", successor, app));
        self.run(ctx, log, &["rename", successor, app])
            .await
            .map_err(&incomplete)?;
        Ok(())
    }

    /// Writes the rendered manifest for `app` into the staging directory
    pub async fn stage_manifest(
        &self,
        ctx: &DeployContext,
        app: &str,
    ) -> Result<PathBuf, EngineError> {
        let rendered = render_manifest(ctx.manifest.as_deref(), app, &ctx.env_vars)?;
        tokio::fs::create_dir_all(&ctx.staging_dir)
            .await
            .map_err(|e| EngineError::io("Failed to create staging directory", e))?;
        let path = ctx.staging_dir.join(MANIFEST_FILE);
        tokio::fs::write(&path, rendered)
            .await
            .map_err(|e| EngineError::io("Failed to write manifest", e))?;
        Ok(path)
    }

    /// `cf push {app} -f manifest.yml [-p artifact] {extra}`
    pub async fn push(
        &self,
        ctx: &DeployContext,
        log: &StepLog,
        app: &str,
        extra: &[&str],
    ) -> Result<(), EngineError> {
        self.stage_manifest(ctx, app).await?;

        let mut args = vec!["push".to_string(), app.to_string(), "-f".to_string(), MANIFEST_FILE.to_string()];
        if let Some(artifact) = &ctx.artifact {
            args.push("-p".to_string());
            args.push(artifact.display().to_string());
        }
        args.extend(extra.iter().map(|a| a.to_string()));

        self.exec(&self.command(ctx, args), log).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::test_support::context;
    use crate::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_push_writes_manifest_and_passes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let cf = CfCli::new(runner.clone());
        let mut ctx = context(dir.path());
        ctx.platform_env = vec![("CF_HOME".to_string(), "/tmp/cf-home".to_string())];

        cf.push(&ctx, &StepLog::new(), "shop", &["--strategy", "rolling"])
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls[0].display(),
            format!(
                "cf push shop -f manifest.yml -p {} --strategy rolling",
                dir.path().join("artifact.jar").display()
            )
        );
        assert_eq!(calls[0].cwd.as_deref(), Some(dir.path()));
        assert_eq!(calls[0].env, ctx.platform_env);
        let manifest = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(manifest.contains("name: shop"));
    }

    #[tokio::test]
    async fn test_health_probe_uses_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("cf ssh shop-green", 22, "curl: (22) 503");
        let cf = CfCli::new(runner.clone());
        let ctx = context(dir.path());

        let healthy = cf
            .healthy(&ctx, &StepLog::new(), "shop-green", "http://localhost:8080/health")
            .await
            .unwrap();

        assert!(!healthy);
        assert_eq!(
            runner.command_lines(),
            vec!["cf ssh shop-green -c curl -sf http://localhost:8080/health"]
        );
    }
}
