//! Data Transfer Objects for inter-service communication
//!
//! This module contains the messages exchanged with the rest of the platform:
//! inbound build/deploy requests and outbound metric events.

pub mod build;
pub mod deploy;
pub mod metric;
