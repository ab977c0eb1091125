//! Build pipelines
//!
//! A pipeline turns a materialized project workspace into a packaged
//! artifact in object storage. Pipelines only describe their steps
//! ([`BuildPipeline::plan`]); [`steps::PipelineExecutor`] runs them so every
//! language shares the same logging, short-circuit and upload behavior.

pub mod dispatcher;
pub mod go;
pub mod java;
pub mod node;
pub mod python;
pub mod registry;
pub mod steps;

use cfforge_core::domain::build::BuildStatus;
use cfforge_core::domain::project::Language;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::process::Command;
pub use steps::{ArtifactSource, PipelineExecutor, Step};

/// Inputs of one pipeline execution
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub project_id: Uuid,
    pub build_id: Uuid,
    /// Isolated directory holding the project sources
    pub work_dir: PathBuf,
    pub language: Language,
    pub framework: Option<String>,
}

impl BuildContext {
    /// A command that runs inside the workspace
    pub fn command(&self, program: impl Into<String>) -> Command {
        Command::new(program).current_dir(&self.work_dir)
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(relative)
    }

    pub fn has(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }
}

/// Outcome of a pipeline execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// `SUCCESS` or `FAILED`
    pub status: BuildStatus,
    pub log: String,
    pub artifact_key: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

/// A language-specific build
pub trait BuildPipeline: Send + Sync {
    fn language(&self) -> Language;

    /// Ordered steps for the given workspace
    ///
    /// Conditional steps (tests, optional manifests) are decided here by
    /// inspecting the workspace.
    fn plan(&self, ctx: &BuildContext) -> Vec<Step>;
}
