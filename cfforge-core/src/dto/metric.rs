//! Metric event DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const BUILD_COMPLETED: &str = "build.completed";
pub const BUILD_FAILED: &str = "build.failed";
pub const BUILD_BLOCKED: &str = "build.blocked";
pub const DEPLOY_COMPLETED: &str = "deploy.completed";
pub const DEPLOY_FAILED: &str = "deploy.failed";
pub const DEPLOY_ROLLED_BACK: &str = "deploy.rolled_back";

/// Event published once per completed build or deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub project_id: Uuid,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricEvent {
    pub fn success(
        event_type: &str,
        source: impl Into<String>,
        project_id: Uuid,
        duration_ms: i64,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: source.into(),
            project_id,
            duration_ms: Some(duration_ms),
            success: true,
            error_message: None,
            dimensions: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        event_type: &str,
        source: impl Into<String>,
        project_id: Uuid,
        duration_ms: i64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: source.into(),
            project_id,
            duration_ms: Some(duration_ms),
            success: false,
            error_message: Some(error_message.into()),
            dimensions: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_dimension(mut self, key: &str, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_event_wire_shape() {
        let event = MetricEvent::failure(BUILD_FAILED, "builder-1", Uuid::nil(), 42, "boom")
            .with_dimension("language", "GO");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "build.failed");
        assert_eq!(json["projectId"], Uuid::nil().to_string());
        assert_eq!(json["durationMs"], 42);
        assert_eq!(json["success"], false);
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["dimensions"]["language"], "GO");
    }
}
