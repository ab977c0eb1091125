//! Deployment strategies and dispatch
//!
//! A strategy drives the `cf` CLI through the process runner to replace the
//! running version of an application. [`strategy::DeployStrategy::execute`]
//! holds the policy shared by every strategy: a failing deploy is rolled
//! back and reported as `FAILED`, never raised.

pub mod blue_green;
pub mod canary;
pub mod cf;
pub mod dispatcher;
pub mod fanout;
pub mod manifest;
pub mod registry;
pub mod rolling;
pub mod strategy;

use cfforge_core::domain::deployment::{DeployEnvironment, DeployStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

pub use strategy::DeployStrategy;

/// Inputs of one strategy execution
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub project_id: Uuid,
    pub deployment_id: Uuid,
    /// Production application name on the platform
    pub app_name: String,
    pub environment: DeployEnvironment,
    /// Shared routing domain, e.g. `apps.sys.example.com`
    pub domain: String,
    /// Local path of the staged build artifact
    pub artifact: Option<PathBuf>,
    /// Manifest YAML to render for the push
    pub manifest: Option<String>,
    pub env_vars: BTreeMap<String, String>,
    /// Per-execution scratch directory; `cf` runs from here
    pub staging_dir: PathBuf,
    /// Extra environment for every `cf` invocation (e.g. `CF_HOME`)
    pub platform_env: Vec<(String, String)>,
}

impl DeployContext {
    pub fn url(&self) -> String {
        format!("https://{}.{}", self.app_name, self.domain)
    }
}

/// Outcome of a strategy execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// `DEPLOYED` or `FAILED`
    pub status: DeployStatus,
    pub deployment_url: Option<String>,
    pub log: String,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

impl DeployResult {
    pub fn deployed(url: String, log: String, duration_ms: i64) -> Self {
        Self {
            status: DeployStatus::Deployed,
            deployment_url: Some(url),
            log,
            error_message: None,
            duration_ms,
        }
    }

    pub fn failed(error_message: impl Into<String>, log: String, duration_ms: i64) -> Self {
        Self {
            status: DeployStatus::Failed,
            deployment_url: None,
            log,
            error_message: Some(error_message.into()),
            duration_ms,
        }
    }
}
