//! Build and deploy engine
//!
//! Turns queued build jobs into packaged artifacts and pending deployments
//! into running applications on a Cloud Foundry foundation. Every external
//! tool runs through [`process::CommandRunner`], every persisted record goes
//! through the traits in [`repository`].

pub mod build;
pub mod collaborators;
pub mod deploy;
pub mod error;
pub mod events;
pub mod locks;
pub mod log_buffer;
pub mod process;
pub mod repository;
pub mod security;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::Collaborators;
pub use error::EngineError;
