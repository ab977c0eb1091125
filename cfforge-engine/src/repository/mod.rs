//! Persistence traits
//!
//! The dispatchers read and write job records only through these traits.
//! The worker provides a Postgres implementation; [`memory`] holds an
//! in-process one.

pub mod memory;

use async_trait::async_trait;
use cfforge_core::domain::build::BuildJob;
use cfforge_core::domain::deployment::{DeployEnvironment, DeploymentJob};
use cfforge_core::domain::project::{DeployTarget, Project};
use uuid::Uuid;

use crate::error::RepositoryError;

#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// Most recently created build of a project
    async fn latest_build(&self, project_id: Uuid) -> Result<Option<BuildJob>, RepositoryError>;

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildJob>, RepositoryError>;

    /// Most recent build of a project that ended in `SUCCESS`
    async fn latest_successful_build(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BuildJob>, RepositoryError>;

    /// Inserts or updates a build record
    async fn save_build(&self, build: &BuildJob) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Most recently created deployment of a project
    async fn latest_deployment(
        &self,
        project_id: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError>;

    async fn find_deployment(&self, id: Uuid) -> Result<Option<DeploymentJob>, RepositoryError>;

    /// Most recent `DEPLOYED` deployment of (project, environment), other than `excluding`
    async fn last_deployed(
        &self,
        project_id: Uuid,
        environment: DeployEnvironment,
        excluding: Uuid,
    ) -> Result<Option<DeploymentJob>, RepositoryError>;

    /// Inserts or updates a deployment record
    async fn save_deployment(&self, deployment: &DeploymentJob) -> Result<(), RepositoryError>;
}

/// Read-only access to projects and deployment targets
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, RepositoryError>;

    async fn find_target(&self, id: Uuid) -> Result<Option<DeployTarget>, RepositoryError>;
}
