//! Deploy pipeline for ECS services.
//!
//! Two operator-authored templates (task definition and service) are resolved
//! against bindings produced as the pipeline runs, registered with the
//! platform, and applied to a running service.
//!
//! External systems sit behind the traits in [`platform`]; [`ecs`] and
//! [`docker`] provide the production implementations.

pub mod config;
pub mod docker;
pub mod ecs;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod pipeline;
pub mod platform;
pub mod publisher;
pub mod reconciler;
pub mod registrar;
pub mod resolve;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BossError, Result};
