//! Seams to the outside world: the orchestration platform, the image builder
//! and the image registry.
//!
//! Core components only ever see these traits. `ecs.rs` and `docker.rs`
//! provide the production implementations.

use crate::resolve::ResolvedDocument;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

// ---------------------------------------------------------------------------
// Platform types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRevision {
    pub family: String,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

impl TaskRevision {
    pub fn family_revision(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}

/// A registered revision together with the definition the platform stores.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTask {
    pub revision: TaskRevision,
    pub definition: Value,
}

/// Last observed rollout status of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub desired_count: u32,
    pub running_count: u32,
    pub deployment_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,
}

impl ServiceStatus {
    pub fn is_stable(&self) -> bool {
        !self.deployment_in_progress && self.running_count == self.desired_count
    }
}

/// Platform failures, split by whether retrying the same request could help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The platform refused the request as invalid.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Unavailable(String),
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Platform: Send + Sync {
    async fn register_task_revision(
        &self,
        family: &str,
        document: &ResolvedDocument,
    ) -> PlatformResult<TaskRevision>;

    /// The highest registered revision of `family`, queried fresh every call.
    async fn latest_task_revision(&self, family: &str) -> PlatformResult<Option<RegisteredTask>>;

    /// Active services named `service_name` in `cluster`. Normally zero or one.
    async fn find_service(&self, cluster: &str, service_name: &str) -> PlatformResult<Vec<Value>>;

    async fn create_service(&self, cluster: &str, request: &Value) -> PlatformResult<Value>;

    async fn update_service(
        &self,
        cluster: &str,
        service_name: &str,
        request: &Value,
    ) -> PlatformResult<Value>;

    async fn service_status(&self, cluster: &str, service_name: &str)
        -> PlatformResult<ServiceStatus>;
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `context` into a local image named `image`.
    async fn build(&self, context: &Path, image: &str, args: &[String]) -> crate::Result<()>;

    async fn tag(&self, source: &str, target: &str) -> crate::Result<()>;

    async fn has_local_image(&self, reference: &str) -> crate::Result<bool>;
}

#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn has_tag(&self, repository: &str, tag: &str) -> crate::Result<bool>;

    /// Authenticate and push `repository:tag`.
    async fn push(&self, repository: &str, tag: &str) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_needs_matching_counts_and_no_rollout() {
        let mut status = ServiceStatus {
            desired_count: 2,
            running_count: 2,
            deployment_in_progress: false,
            task_definition: None,
        };
        assert!(status.is_stable());
        status.deployment_in_progress = true;
        assert!(!status.is_stable());
        status.deployment_in_progress = false;
        status.running_count = 1;
        assert!(!status.is_stable());
    }
}
