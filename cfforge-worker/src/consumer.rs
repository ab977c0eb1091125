//! Message consumer
//!
//! Build and deploy requests arrive on a bounded channel and are handed to
//! the dispatchers, each in its own task, with at most
//! `max_concurrent_jobs` running at once. Messages of one project wait for
//! each other before taking a job slot, so a busy project never holds the
//! slots other projects need. Delivery is at least once; the dispatchers
//! ignore requests whose job is already finished.

use anyhow::Result;
use async_trait::async_trait;
use cfforge_core::dto::build::BuildRequest;
use cfforge_core::dto::deploy::DeployRequest;
use cfforge_engine::build::dispatcher::BuildDispatcher;
use cfforge_engine::deploy::dispatcher::DeployDispatcher;
use cfforge_engine::locks::ProjectLocks;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

/// A request taken off the build or deploy queue
#[derive(Debug, Clone)]
pub enum Message {
    Build(BuildRequest),
    Deploy(DeployRequest),
}

impl Message {
    pub fn project_id(&self) -> uuid::Uuid {
        match self {
            Message::Build(request) => request.project_id,
            Message::Deploy(request) => request.project_id,
        }
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<()>;
}

/// Routes messages to the build and deploy dispatchers
pub struct Dispatchers {
    pub build: Arc<BuildDispatcher>,
    pub deploy: Arc<DeployDispatcher>,
}

#[async_trait]
impl MessageHandler for Dispatchers {
    async fn handle(&self, message: Message) -> Result<()> {
        match message {
            Message::Build(request) => {
                let job = self.build.handle(&request).await?;
                info!(
                    project_id = %request.project_id,
                    build_id = %job.id,
                    "Build request handled: {}",
                    job.status
                );
            }
            Message::Deploy(request) => {
                let job = self.deploy.handle(&request).await?;
                info!(
                    project_id = %request.project_id,
                    deployment_id = %job.id,
                    "Deploy request handled: {}",
                    job.status
                );
            }
        }
        Ok(())
    }
}

pub struct MessageConsumer {
    handler: Arc<dyn MessageHandler>,
    /// Jobs running at once
    workers: Arc<Semaphore>,
    /// Messages taken off the channel and not finished yet
    in_flight: Arc<Semaphore>,
    builds: Arc<ProjectLocks>,
    deploys: Arc<ProjectLocks>,
}

impl MessageConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, max_concurrent_jobs: usize) -> Self {
        Self {
            handler,
            workers: Arc::new(Semaphore::new(max_concurrent_jobs)),
            in_flight: Arc::new(Semaphore::new(max_concurrent_jobs * 4)),
            builds: Arc::new(ProjectLocks::new()),
            deploys: Arc::new(ProjectLocks::new()),
        }
    }

    /// Consumes messages until every sender is dropped, then waits for the
    /// jobs still running
    pub async fn run(&self, mut receiver: mpsc::Receiver<Message>) -> Result<()> {
        info!(
            "Starting message consumer ({} concurrent jobs)",
            self.workers.available_permits()
        );

        let mut handles = Vec::new();

        while let Some(message) = receiver.recv().await {
            // Waiting here leaves messages on the channel, which pushes back on the intake
            let in_flight = self.in_flight.clone().acquire_owned().await?;
            let handler = Arc::clone(&self.handler);
            let workers = Arc::clone(&self.workers);
            let locks = match message {
                Message::Build(_) => Arc::clone(&self.builds),
                Message::Deploy(_) => Arc::clone(&self.deploys),
            };

            debug!(project_id = %message.project_id(), "Dispatching message");
            handles.push(tokio::spawn(async move {
                let project_id = message.project_id();
                let _project = locks.acquire(project_id).await;
                let Ok(_worker) = workers.acquire_owned().await else {
                    return;
                };
                if let Err(e) = handler.handle(message).await {
                    error!(project_id = %project_id, "Failed to handle message: {:#}", e);
                }
                drop(in_flight);
            }));
            handles.retain(|handle| !handle.is_finished());
        }

        info!("Message channel closed, waiting for running jobs");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Job task panicked: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfforge_core::domain::deployment::DeployEnvironment;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<Uuid>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: Message) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.seen.lock().unwrap().push(message.project_id());
            if matches!(message, Message::Deploy(_)) {
                anyhow::bail!("deploy failed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consumer_limits_concurrency_and_drains() {
        let handler = Arc::new(RecordingHandler::default());
        let consumer = MessageConsumer::new(handler.clone(), 2);
        let (sender, receiver) = mpsc::channel(16);

        for _ in 0..5 {
            sender
                .send(Message::Build(BuildRequest {
                    project_id: Uuid::new_v4(),
                }))
                .await
                .unwrap();
        }
        sender
            .send(Message::Deploy(DeployRequest {
                project_id: Uuid::new_v4(),
                environment: DeployEnvironment::Staging,
            }))
            .await
            .unwrap();
        drop(sender);

        consumer.run(receiver).await.unwrap();

        // a failing message does not stop the others
        assert_eq!(handler.seen.lock().unwrap().len(), 6);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    /// Handler whose jobs for one project take long enough to overlap
    #[derive(Default)]
    struct ProjectHandler {
        finished: Mutex<Vec<Uuid>>,
        running: Mutex<Vec<Uuid>>,
        overlapped: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for ProjectHandler {
        async fn handle(&self, message: Message) -> Result<()> {
            let project_id = message.project_id();
            {
                let mut running = self.running.lock().unwrap();
                if running.contains(&project_id) {
                    self.overlapped.fetch_add(1, Ordering::SeqCst);
                }
                running.push(project_id);
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.lock().unwrap().retain(|id| *id != project_id);
            self.finished.lock().unwrap().push(project_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_busy_project_does_not_hold_every_slot() {
        let handler = Arc::new(ProjectHandler::default());
        let consumer = MessageConsumer::new(handler.clone(), 2);
        let (sender, receiver) = mpsc::channel(16);
        let busy = Uuid::new_v4();
        let other = Uuid::new_v4();

        for _ in 0..4 {
            sender
                .send(Message::Build(BuildRequest { project_id: busy }))
                .await
                .unwrap();
        }
        sender
            .send(Message::Build(BuildRequest { project_id: other }))
            .await
            .unwrap();
        drop(sender);

        consumer.run(receiver).await.unwrap();

        let finished = handler.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 5);
        assert_eq!(handler.overlapped.load(Ordering::SeqCst), 0);
        // runs beside the first busy job instead of after all four
        let position = finished.iter().position(|id| *id == other).unwrap();
        assert!(position <= 1, "other project finished at {position}");
    }
}
