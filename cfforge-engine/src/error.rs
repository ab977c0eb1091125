//! Engine error types

use cfforge_core::domain::TransitionError;
use cfforge_core::domain::deployment::StrategyKind;
use cfforge_core::domain::project::Language;
use thiserror::Error;
use uuid::Uuid;

use crate::process::ProcessError;

/// Errors raised by an object store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("persistence backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
}

impl RepositoryError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RepositoryError::Backend(Box::new(err))
    }
}

/// Errors surfaced by the build and deploy engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("No build pipeline for language: {0}")]
    UnsupportedLanguage(Language),

    #[error("No deploy strategy registered for {0}")]
    StrategyNotRegistered(StrategyKind),

    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("No build job found for project {0}")]
    NoBuildJob(Uuid),

    #[error("Build not found: {0}")]
    BuildNotFound(Uuid),

    #[error("No deployment job found for project {0}")]
    NoDeploymentJob(Uuid),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(Uuid),

    #[error("Artifact not found: {0}")]
    MissingArtifact(String),

    #[error("{0}")]
    HealthCheck(String),

    /// The new instance already serves the route alone; deleting it would
    /// leave the application without any instance
    #[error("Cutover to {successor} incomplete: {source}")]
    CutoverIncomplete {
        successor: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Failed to restore previous deployment: {0}")]
    Restore(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Converts a caught panic payload into an error
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        EngineError::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_message() {
        let err = EngineError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "worker panicked: boom");

        let err = EngineError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "worker panicked: owned");

        let err = EngineError::from_panic(Box::new(17u32));
        assert_eq!(err.to_string(), "worker panicked: unknown panic");
    }

    #[test]
    fn test_unsupported_language_message() {
        let err = EngineError::UnsupportedLanguage(Language::Ruby);
        assert_eq!(err.to_string(), "No build pipeline for language: RUBY");
    }
}
