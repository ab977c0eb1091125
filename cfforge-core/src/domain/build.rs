//! Build domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::vulnerability::VulnerabilityReport;
use super::{ParseEnumError, TransitionError};

/// Build job record
///
/// Created by the API when a build is requested, mutated only by the build
/// dispatcher, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub trigger_type: TriggerType,
    pub status: BuildStatus,
    pub build_log: String,
    pub artifact_key: Option<String>,
    pub sbom_key: Option<String>,
    pub vulnerability_report: Option<VulnerabilityReport>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuildJob {
    /// Creates a new queued build for a project
    pub fn queued(project_id: Uuid, trigger_type: TriggerType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            trigger_type,
            status: BuildStatus::Queued,
            build_log: String::new(),
            artifact_key: None,
            sbom_key: None,
            vulnerability_report: None,
            error_message: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job to `next`, rejecting transitions out of terminal states
    pub fn transition(&mut self, next: BuildStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                entity: "build",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Build status
///
/// `QUEUED -> BUILDING -> {SUCCESS | FAILED}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Queued,
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }

    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        matches!(
            (self, next),
            (Queued, Building)
                | (Queued, Failed)
                // restart of a run interrupted before it was finalized
                | (Building, Building)
                | (Building, Success)
                | (Building, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Queued => "QUEUED",
            BuildStatus::Building => "BUILDING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(BuildStatus::Queued),
            "BUILDING" => Ok(BuildStatus::Building),
            "SUCCESS" => Ok(BuildStatus::Success),
            "FAILED" => Ok(BuildStatus::Failed),
            other => Err(ParseEnumError::new("build status", other)),
        }
    }
}

/// What requested the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Automated,
    Agent,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Manual => "MANUAL",
            TriggerType::Automated => "AUTOMATED",
            TriggerType::Agent => "AGENT",
        }
    }
}

impl FromStr for TriggerType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(TriggerType::Manual),
            "AUTOMATED" => Ok(TriggerType::Automated),
            "AGENT" => Ok(TriggerType::Agent),
            other => Err(ParseEnumError::new("trigger type", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_happy_path() {
        let mut job = BuildJob::queued(Uuid::new_v4(), TriggerType::Manual);
        assert!(job.transition(BuildStatus::Building).is_ok());
        assert!(job.transition(BuildStatus::Success).is_ok());
        assert_eq!(job.status, BuildStatus::Success);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [BuildStatus::Success, BuildStatus::Failed] {
            for next in [
                BuildStatus::Queued,
                BuildStatus::Building,
                BuildStatus::Success,
                BuildStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }

        let mut job = BuildJob::queued(Uuid::new_v4(), TriggerType::Agent);
        job.transition(BuildStatus::Failed).unwrap();
        let err = job.transition(BuildStatus::Building).unwrap_err();
        assert_eq!(err.from, "FAILED");
        assert_eq!(err.to, "BUILDING");
    }

    #[test]
    fn test_build_status_round_trips_as_string_enum() {
        let json = serde_json::to_string(&BuildStatus::Building).unwrap();
        assert_eq!(json, "\"BUILDING\"");
        assert_eq!("SUCCESS".parse::<BuildStatus>().unwrap(), BuildStatus::Success);
        assert!("success".parse::<BuildStatus>().is_err());
    }
}
