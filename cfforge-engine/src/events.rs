//! Metric event publishing
//!
//! Dispatchers publish exactly one event per finished build or deployment.
//! A failed publish is logged and never changes the job outcome.

use async_trait::async_trait;
use cfforge_core::dto::metric::MetricEvent;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("failed to publish metric event: {0}")]
pub struct PublishError(pub String);

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &MetricEvent) -> Result<(), PublishError>;
}

/// Writes events to the tracing log
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &MetricEvent) -> Result<(), PublishError> {
        info!(
            event_type = %event.event_type,
            project_id = %event.project_id,
            success = event.success,
            duration_ms = event.duration_ms,
            "Metric event"
        );
        Ok(())
    }
}

/// Publishes `event`, logging instead of failing
pub async fn emit(publisher: &dyn EventPublisher, event: MetricEvent) {
    if let Err(e) = publisher.publish(&event).await {
        warn!(
            "Dropping {} event for project {}: {}",
            event.event_type, event.project_id, e
        );
    }
}
