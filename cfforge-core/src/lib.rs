//! CF Forge Core
//!
//! Core types and abstractions for the CF Forge build and deploy engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (BuildJob, DeploymentJob, Project, etc.)
//! - DTOs: Messages consumed and published by the dispatchers
//! - Storage: Object storage key conventions shared with other services

pub mod domain;
pub mod dto;
pub mod storage;
