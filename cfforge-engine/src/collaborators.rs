//! Shared collaborators of the dispatchers

use std::sync::Arc;

use crate::events::EventPublisher;
use crate::process::CommandRunner;
use crate::repository::{BuildRepository, DeploymentRepository, ProjectRepository};
use crate::storage::ObjectStore;

/// Handles to everything a dispatcher talks to outside the process
#[derive(Clone)]
pub struct Collaborators {
    pub builds: Arc<dyn BuildRepository>,
    pub deployments: Arc<dyn DeploymentRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventPublisher>,
    pub runner: Arc<dyn CommandRunner>,
}
