//! In-memory repository
//!
//! Keeps every record in process memory. Used for embedding the engine and in tests.

use async_trait::async_trait;
use cfforge_core::domain::build::{BuildJob, BuildStatus};
use cfforge_core::domain::deployment::{DeployEnvironment, DeployStatus, DeploymentJob};
use cfforge_core::domain::project::{DeployTarget, Project};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{BuildRepository, DeploymentRepository, ProjectRepository};
use crate::error::RepositoryError;

#[derive(Default)]
struct Records {
    projects: HashMap<Uuid, Project>,
    targets: HashMap<Uuid, DeployTarget>,
    builds: HashMap<Uuid, BuildJob>,
    deployments: HashMap<Uuid, DeploymentJob>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    records: Mutex<Records>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_project(&self, project: Project) {
        self.lock().projects.insert(project.id, project);
    }

    pub fn insert_target(&self, target: DeployTarget) {
        self.lock().targets.insert(target.id, target);
    }

    pub fn insert_build(&self, build: BuildJob) {
        self.lock().builds.insert(build.id, build);
    }

    pub fn insert_deployment(&self, deployment: DeploymentJob) {
        self.lock().deployments.insert(deployment.id, deployment);
    }
}

#[async_trait]
impl BuildRepository for InMemoryRepository {
    async fn latest_build(&self, project_id: Uuid) -> Result<Option<BuildJob>, RepositoryError> {
        Ok(self
            .lock()
            .builds
            .values()
            .filter(|b| b.project_id == project_id)
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildJob>, RepositoryError> {
        Ok(self.lock().builds.get(&id).cloned())
    }

    async fn latest_successful_build(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BuildJob>, RepositoryError> {
        Ok(self
            .lock()
            .builds
            .values()
            .filter(|b| b.project_id == project_id && b.status == BuildStatus::Success)
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn save_build(&self, build: &BuildJob) -> Result<(), RepositoryError> {
        self.lock().builds.insert(build.id, build.clone());
        Ok(())
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryRepository {
    async fn latest_deployment(
        &self,
        project_id: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError> {
        Ok(self
            .lock()
            .deployments
            .values()
            .filter(|d| d.project_id == project_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn find_deployment(&self, id: Uuid) -> Result<Option<DeploymentJob>, RepositoryError> {
        Ok(self.lock().deployments.get(&id).cloned())
    }

    async fn last_deployed(
        &self,
        project_id: Uuid,
        environment: DeployEnvironment,
        excluding: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError> {
        Ok(self
            .lock()
            .deployments
            .values()
            .filter(|d| {
                d.project_id == project_id
                    && d.environment == environment
                    && d.status == DeployStatus::Deployed
                    && d.id != excluding
            })
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn save_deployment(&self, deployment: &DeploymentJob) -> Result<(), RepositoryError> {
        self.lock()
            .deployments
            .insert(deployment.id, deployment.clone());
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for InMemoryRepository {
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, RepositoryError> {
        Ok(self.lock().projects.get(&id).cloned())
    }

    async fn find_target(&self, id: Uuid) -> Result<Option<DeployTarget>, RepositoryError> {
        Ok(self.lock().targets.get(&id).cloned())
    }
}
