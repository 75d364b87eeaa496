//! In-memory collaborators for exercising the pipeline without AWS or Docker.

use crate::error::{BossError, Result};
use crate::platform::{
    ImageBuilder, ImageRegistry, Platform, PlatformError, PlatformResult, RegisteredTask,
    ServiceStatus, TaskRevision,
};
use crate::resolve::ResolvedDocument;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// FakePlatform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlatformState {
    revisions: BTreeMap<String, Vec<RegisteredTask>>,
    services: Vec<(String, String, Value)>,
    registrations: usize,
    creates: usize,
    updates: usize,
    status_polls: usize,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    reject_registration: Option<String>,
    reject_services: Option<String>,
    /// Polls reporting a rollout in progress before the service settles.
    settle_after: usize,
    stalled_status: bool,
}

impl FakePlatform {
    /// Seed `family` so that its latest revision is `revision`.
    pub fn with_revision(self, family: &str, revision: u64) -> Self {
        self.with_registered(
            family,
            revision,
            json!({"family": family, "containerDefinitions": []}),
        )
    }

    pub fn with_registered(self, family: &str, revision: u64, definition: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .revisions
            .entry(family.to_string())
            .or_default()
            .push(RegisteredTask {
                revision: TaskRevision {
                    family: family.to_string(),
                    revision,
                    arn: None,
                },
                definition,
            });
        self
    }

    pub fn with_service(self, cluster: &str, name: &str, attributes: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .services
            .push((cluster.to_string(), name.to_string(), attributes));
        self
    }

    pub fn rejecting_registration(mut self, message: &str) -> Self {
        self.reject_registration = Some(message.to_string());
        self
    }

    pub fn rejecting_services(mut self, message: &str) -> Self {
        self.reject_services = Some(message.to_string());
        self
    }

    /// Every status poll reports a deployment still in progress.
    pub fn never_settles(self) -> Self {
        self.settles_after(usize::MAX)
    }

    /// The first `polls` status calls report a rollout in progress.
    pub fn settles_after(mut self, polls: usize) -> Self {
        self.settle_after = polls;
        self
    }

    /// Status calls never answer.
    pub fn stalled_status(mut self) -> Self {
        self.stalled_status = true;
        self
    }

    pub fn service(&self, cluster: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|(c, n, _)| c == cluster && n == name)
            .map(|(_, _, v)| v.clone())
    }

    pub fn latest_revision(&self, family: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .revisions
            .get(family)
            .and_then(|r| r.last())
            .map(|r| r.revision.revision)
    }

    pub fn registrations(&self) -> usize {
        self.state.lock().unwrap().registrations
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    pub fn status_polls(&self) -> usize {
        self.state.lock().unwrap().status_polls
    }

    fn check_services(&self) -> PlatformResult<()> {
        match &self.reject_services {
            Some(m) => Err(PlatformError::Rejected(m.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn register_task_revision(
        &self,
        family: &str,
        document: &ResolvedDocument,
    ) -> PlatformResult<TaskRevision> {
        if let Some(m) = &self.reject_registration {
            return Err(PlatformError::Rejected(m.clone()));
        }
        let mut state = self.state.lock().unwrap();
        state.registrations += 1;
        let history = state.revisions.entry(family.to_string()).or_default();
        let next = history.last().map_or(1, |r| r.revision.revision + 1);
        let revision = TaskRevision {
            family: family.to_string(),
            revision: next,
            arn: Some(format!("arn:aws:ecs:us-east-1:1:task-definition/{family}:{next}")),
        };
        history.push(RegisteredTask {
            revision: revision.clone(),
            definition: document.as_value().clone(),
        });
        Ok(revision)
    }

    async fn latest_task_revision(&self, family: &str) -> PlatformResult<Option<RegisteredTask>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .revisions
            .get(family)
            .and_then(|r| r.last().cloned()))
    }

    async fn find_service(&self, cluster: &str, service_name: &str) -> PlatformResult<Vec<Value>> {
        self.check_services()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .filter(|(c, n, _)| c == cluster && n == service_name)
            .map(|(_, _, v)| v.clone())
            .collect())
    }

    async fn create_service(&self, cluster: &str, request: &Value) -> PlatformResult<Value> {
        self.check_services()?;
        let name = request
            .get("serviceName")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::Rejected("serviceName is required".into()))?
            .to_string();
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        state
            .services
            .push((cluster.to_string(), name, request.clone()));
        Ok(request.clone())
    }

    async fn update_service(
        &self,
        cluster: &str,
        service_name: &str,
        request: &Value,
    ) -> PlatformResult<Value> {
        self.check_services()?;
        let mut state = self.state.lock().unwrap();
        state.updates += 1;
        let (_, _, current) = state
            .services
            .iter_mut()
            .find(|(c, n, _)| c == cluster && n == service_name)
            .ok_or_else(|| PlatformError::Rejected("ServiceNotFoundException".into()))?;
        if let (Some(current), Some(changes)) = (current.as_object_mut(), request.as_object()) {
            for (k, v) in changes {
                current.insert(k.clone(), v.clone());
            }
        }
        Ok(current.clone())
    }

    async fn service_status(
        &self,
        cluster: &str,
        service_name: &str,
    ) -> PlatformResult<ServiceStatus> {
        if self.stalled_status {
            return std::future::pending().await;
        }
        let mut state = self.state.lock().unwrap();
        state.status_polls += 1;
        let unsettled = state.status_polls <= self.settle_after;
        let service = state
            .services
            .iter()
            .find(|(c, n, _)| c == cluster && n == service_name)
            .map(|(_, _, v)| v.clone())
            .ok_or_else(|| PlatformError::Rejected("ServiceNotFoundException".into()))?;
        let desired = service
            .get("desiredCount")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32;
        Ok(ServiceStatus {
            desired_count: desired,
            running_count: if unsettled { 0 } else { desired },
            deployment_in_progress: unsettled,
            task_definition: service
                .get("taskDefinition")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBuilder {
    builds: Mutex<Vec<String>>,
    tags: Mutex<Vec<(String, String)>>,
    local: Mutex<HashSet<String>>,
    fail: Option<String>,
}

impl FakeBuilder {
    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_local_image(self, reference: &str) -> Self {
        self.local.lock().unwrap().insert(reference.to_string());
        self
    }

    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, _context: &Path, image: &str, _args: &[String]) -> Result<()> {
        if let Some(m) = &self.fail {
            return Err(BossError::BuildFailure(m.clone()));
        }
        self.builds.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.tags
            .lock()
            .unwrap()
            .push((source.to_string(), target.to_string()));
        self.local.lock().unwrap().insert(target.to_string());
        Ok(())
    }

    async fn has_local_image(&self, reference: &str) -> Result<bool> {
        Ok(self.local.lock().unwrap().contains(reference))
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegistry {
    tags: Mutex<HashSet<(String, String)>>,
    pushed: Mutex<Vec<String>>,
    lookups: Mutex<usize>,
    reject_push: Option<String>,
    raise_on_push: Option<Arc<AtomicBool>>,
}

impl FakeRegistry {
    pub fn with_tags(tags: &[(&str, &str)]) -> Self {
        let registry = Self::default();
        registry.tags.lock().unwrap().extend(
            tags.iter()
                .map(|(repo, tag)| (repo.to_string(), tag.to_string())),
        );
        registry
    }

    pub fn rejecting_push(message: &str) -> Self {
        Self {
            reject_push: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Set `flag` once a push completes.
    pub fn raising_on_push(mut self, flag: Arc<AtomicBool>) -> Self {
        self.raise_on_push = Some(flag);
        self
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl ImageRegistry for FakeRegistry {
    async fn has_tag(&self, repository: &str, tag: &str) -> Result<bool> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self
            .tags
            .lock()
            .unwrap()
            .contains(&(repository.to_string(), tag.to_string())))
    }

    async fn push(&self, repository: &str, tag: &str) -> Result<()> {
        if let Some(m) = &self.reject_push {
            return Err(BossError::PushFailure(m.clone()));
        }
        self.pushed.lock().unwrap().push(format!("{repository}:{tag}"));
        self.tags
            .lock()
            .unwrap()
            .insert((repository.to_string(), tag.to_string()));
        if let Some(flag) = &self.raise_on_push {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
