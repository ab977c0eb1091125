//! HTTP metric publisher

use async_trait::async_trait;
use cfforge_core::dto::metric::MetricEvent;
use cfforge_engine::events::{EventPublisher, PublishError};
use reqwest::Client;
use std::time::Duration;

/// POSTs every metric event as JSON to a collector endpoint
#[derive(Debug, Clone)]
pub struct HttpEventPublisher {
    url: String,
    client: Client,
}

impl HttpEventPublisher {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: &MetricEvent) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| PublishError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PublishError(format!("status {}: {}", status.as_u16(), body)));
        }

        tracing::debug!(event_type = %event.event_type, "Published metric event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfforge_core::dto::metric::BUILD_COMPLETED;
    use uuid::Uuid;

    #[test]
    fn test_publisher_trims_trailing_slash() {
        let publisher = HttpEventPublisher::new("http://metrics.local/events/").unwrap();
        assert_eq!(publisher.url(), "http://metrics.local/events");
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_publish_error() {
        let publisher = HttpEventPublisher::new("http://127.0.0.1:9/events").unwrap();
        let event = MetricEvent::success(BUILD_COMPLETED, "worker-1", Uuid::nil(), 10);
        assert!(publisher.publish(&event).await.is_err());
    }
}
