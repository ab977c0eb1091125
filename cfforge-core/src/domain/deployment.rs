//! Deployment domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, TransitionError};

/// Deployment job record
///
/// Always belongs to exactly one project. `previous_deployment_id` points at
/// the last successful deployment of the same (project, environment) pair at
/// dispatch time and is what an explicit rollback restores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub build_id: Option<Uuid>,
    /// Strategy name as requested; resolved by the strategy registry
    pub strategy: String,
    pub environment: DeployEnvironment,
    pub status: DeployStatus,
    pub manifest: Option<String>,
    pub deployment_url: Option<String>,
    pub deploy_log: String,
    pub error_message: Option<String>,
    pub previous_deployment_id: Option<Uuid>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentJob {
    /// Creates a new pending deployment
    pub fn pending(
        project_id: Uuid,
        build_id: Option<Uuid>,
        strategy: impl Into<String>,
        environment: DeployEnvironment,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            build_id,
            strategy: strategy.into(),
            environment,
            status: DeployStatus::Pending,
            manifest: None,
            deployment_url: None,
            deploy_log: String::new(),
            error_message: None,
            previous_deployment_id: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: DeployStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                entity: "deployment",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Deployment status
///
/// `PENDING -> IN_PROGRESS -> {DEPLOYED | FAILED | ROLLED_BACK}`.
/// `ROLLED_BACK` is only reachable from `DEPLOYED` or `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    Pending,
    InProgress,
    Deployed,
    Failed,
    RolledBack,
}

impl DeployStatus {
    /// True for statuses the dispatcher never moves out of on its own
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeployStatus::Deployed | DeployStatus::Failed | DeployStatus::RolledBack
        )
    }

    pub fn can_transition_to(self, next: DeployStatus) -> bool {
        use DeployStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Failed)
                | (InProgress, InProgress)
                | (InProgress, Deployed)
                | (InProgress, Failed)
                | (Deployed, RolledBack)
                | (Failed, RolledBack)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Pending => "PENDING",
            DeployStatus::InProgress => "IN_PROGRESS",
            DeployStatus::Deployed => "DEPLOYED",
            DeployStatus::Failed => "FAILED",
            DeployStatus::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeployStatus::Pending),
            "IN_PROGRESS" => Ok(DeployStatus::InProgress),
            "DEPLOYED" => Ok(DeployStatus::Deployed),
            "FAILED" => Ok(DeployStatus::Failed),
            "ROLLED_BACK" => Ok(DeployStatus::RolledBack),
            other => Err(ParseEnumError::new("deploy status", other)),
        }
    }
}

/// Target environment of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployEnvironment {
    Staging,
    Production,
}

impl DeployEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployEnvironment::Staging => "STAGING",
            DeployEnvironment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for DeployEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnvironment {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STAGING" => Ok(DeployEnvironment::Staging),
            "PRODUCTION" => Ok(DeployEnvironment::Production),
            _ => Err(ParseEnumError::new("deploy environment", s)),
        }
    }
}

/// Deployment protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    Rolling,
    BlueGreen,
    Canary,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Rolling => "ROLLING",
            StrategyKind::BlueGreen => "BLUE_GREEN",
            StrategyKind::Canary => "CANARY",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ParseEnumError;

    /// Accepts the persisted names (`BLUE_GREEN`) as well as the lower-case
    /// and kebab-case spellings used in configuration (`blue-green`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "rolling" => Ok(StrategyKind::Rolling),
            "bluegreen" => Ok(StrategyKind::BlueGreen),
            "canary" => Ok(StrategyKind::Canary),
            _ => Err(ParseEnumError::new("deploy strategy", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolled_back_only_from_deployed_or_failed() {
        assert!(DeployStatus::Deployed.can_transition_to(DeployStatus::RolledBack));
        assert!(DeployStatus::Failed.can_transition_to(DeployStatus::RolledBack));
        assert!(!DeployStatus::Pending.can_transition_to(DeployStatus::RolledBack));
        assert!(!DeployStatus::InProgress.can_transition_to(DeployStatus::RolledBack));
        assert!(!DeployStatus::RolledBack.can_transition_to(DeployStatus::RolledBack));
    }

    #[test]
    fn test_deployment_transition_records_error() {
        let mut job =
            DeploymentJob::pending(Uuid::new_v4(), None, "ROLLING", DeployEnvironment::Staging);
        job.transition(DeployStatus::InProgress).unwrap();
        job.transition(DeployStatus::Deployed).unwrap();
        assert!(job.transition(DeployStatus::InProgress).is_err());
        job.transition(DeployStatus::RolledBack).unwrap();
        assert_eq!(job.status, DeployStatus::RolledBack);
    }

    #[test]
    fn test_strategy_kind_accepts_config_spellings() {
        assert_eq!("BLUE_GREEN".parse::<StrategyKind>().unwrap(), StrategyKind::BlueGreen);
        assert_eq!("blue-green".parse::<StrategyKind>().unwrap(), StrategyKind::BlueGreen);
        assert_eq!("blueGreen".parse::<StrategyKind>().unwrap(), StrategyKind::BlueGreen);
        assert_eq!("canary".parse::<StrategyKind>().unwrap(), StrategyKind::Canary);
        assert_eq!(" ROLLING ".parse::<StrategyKind>().unwrap(), StrategyKind::Rolling);
        assert!("recreate".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&DeployStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!(
            "ROLLED_BACK".parse::<DeployStatus>().unwrap(),
            DeployStatus::RolledBack
        );
    }
}
