//! Core domain types
//!
//! This module contains the core domain structures used across CF Forge services.
//! These types represent the persisted job records and the project metadata the
//! dispatchers read. Persistence itself lives in the worker, execution in the engine.

pub mod build;
pub mod deployment;
pub mod log;
pub mod project;
pub mod vulnerability;

use thiserror::Error;

/// Error returned when a status change would break the job state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} status transition: {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

/// Error returned when a persisted string does not name a known enum value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
