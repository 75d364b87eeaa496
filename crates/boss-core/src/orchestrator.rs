//! Runs one operation's step list against the platform, builder and registry.
//!
//! Per-run state (bindings, resolved documents, the new revision) lives in a
//! local [`RunState`] and flows forward step by step. The first failure aborts
//! the run; nothing already submitted is rolled back.

use crate::error::{BossError, Result};
use crate::pipeline::{Operation, Step};
use crate::platform::{ImageBuilder, ImageRegistry, Platform, TaskRevision};
use crate::publisher::{self, BuildSpec, ImagePublisher, PublishOutcome, ReleaseTag};
use crate::reconciler::{ReconcileOptions, ServiceReconciler, ServiceState};
use crate::registrar::{self, TaskRegistrar};
use crate::resolve::{self, Bindings, Placeholder, ResolvedDocument};
use crate::template::{Template, TemplateKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// DeployRequest
// ---------------------------------------------------------------------------

/// Everything one invocation needs, gathered from flags, env and config.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub operation: Operation,
    pub task_template: Option<Template>,
    pub service_template: Option<Template>,
    pub repository: Option<String>,
    pub cluster: Option<String>,
    pub service_name: Option<String>,
    pub task_family: Option<String>,
    pub release_tag: Option<ReleaseTag>,
    pub desired_count: Option<u32>,
    pub build_context: PathBuf,
    pub build_args: Vec<String>,
    pub stabilize: ReconcileOptions,
}

impl DeployRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            task_template: None,
            service_template: None,
            repository: None,
            cluster: None,
            service_name: None,
            task_family: None,
            release_tag: None,
            desired_count: None,
            build_context: PathBuf::from("."),
            build_args: Vec::new(),
            stabilize: ReconcileOptions::default(),
        }
    }

    fn template(&self, kind: TemplateKind) -> Option<&Template> {
        match kind {
            TemplateKind::Task => self.task_template.as_ref(),
            TemplateKind::Service => self.service_template.as_ref(),
        }
    }

    fn references(&self, kind: TemplateKind, placeholder: Placeholder) -> bool {
        self.template(kind)
            .is_some_and(|t| t.placeholders().contains(&placeholder))
    }

    /// Check everything that can be checked without touching the network.
    ///
    /// Templates are validated, required names are resolved from flags or
    /// template fields, and every placeholder a template uses must be
    /// bindable by the time that template is resolved.
    pub fn preflight(&self) -> Result<Target> {
        let op = self.operation;

        for kind in op.templates() {
            let template = self.template(kind).ok_or(match kind {
                TemplateKind::Task => BossError::MissingConfig("task template"),
                TemplateKind::Service => BossError::MissingConfig("service template"),
            })?;
            template.validate()?;
        }

        let family = self
            .task_family
            .clone()
            .or_else(|| self.task_template.as_ref()?.family().map(str::to_string))
            .or_else(|| self.service_template.as_ref()?.family().map(str::to_string));
        let needs_family = matches!(op, Operation::Build | Operation::Deploy | Operation::UpdateTask)
            || self.references(TemplateKind::Service, Placeholder::TaskRev);
        if needs_family && family.is_none() {
            return Err(BossError::MissingConfig("task family"));
        }

        // Other operations only need it when a template says so; see check_bindable.
        if op == Operation::Deploy && self.repository.is_none() {
            return Err(BossError::MissingConfig("repository"));
        }

        let (cluster, service_name) = if op.reconciles() {
            let service = self.service_template.as_ref();
            let cluster = self
                .cluster
                .clone()
                .or_else(|| service?.str_field("cluster").map(str::to_string))
                .ok_or(BossError::MissingConfig("cluster"))?;
            let name = self
                .service_name
                .clone()
                .or_else(|| service?.str_field("serviceName").map(str::to_string))
                .ok_or(BossError::MissingConfig("service name"))?;
            (Some(cluster), Some(name))
        } else {
            (None, None)
        };

        if matches!(op, Operation::Build | Operation::Deploy)
            && !publisher::context_exists(&self.build_context)
        {
            return Err(BossError::BuildFailure(format!(
                "build context {} is not a directory",
                self.build_context.display()
            )));
        }

        self.check_bindable()?;

        Ok(Target {
            family,
            cluster,
            service_name,
        })
    }

    /// Walk the steps in order, tracking which placeholders could be bound
    /// when each template gets resolved.
    fn check_bindable(&self) -> Result<()> {
        let mut available = BTreeSet::new();
        if self.repository.is_some() {
            available.insert(Placeholder::Repository);
        }
        if self.release_tag.is_some() {
            available.insert(Placeholder::ReleaseTag);
        }
        for step in self.operation.steps() {
            if let Some(p) = step.provides() {
                available.insert(p);
            }
            let Some(kind) = step.template() else {
                continue;
            };
            let Some(template) = self.template(kind) else {
                continue;
            };
            let unbound: Vec<String> = template
                .placeholders()
                .into_iter()
                .filter(|p| !available.contains(p))
                .map(|p| p.marker().to_string())
                .collect();
            if !unbound.is_empty() {
                return Err(BossError::UnboundPlaceholder {
                    template: kind.to_string(),
                    tokens: unbound,
                });
            }
        }
        Ok(())
    }
}

/// Names settled by pre-flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub family: Option<String>,
    pub cluster: Option<String>,
    pub service_name: Option<String>,
}

// ---------------------------------------------------------------------------
// DeployReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub duration_ms: u64,
    pub skipped: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PublishOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_revision: Option<TaskRevision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceState>,
    pub steps: Vec<StepRecord>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RunState {
    bindings: Bindings,
    image: Option<PublishOutcome>,
    task: Option<ResolvedDocument>,
    service: Option<ResolvedDocument>,
    revision: Option<TaskRevision>,
    reconciled: Option<ServiceState>,
}

enum Outcome {
    Done(String),
    Skipped(String),
}

pub struct Orchestrator<'a> {
    builder: &'a dyn ImageBuilder,
    platform: Option<&'a dyn Platform>,
    registry: Option<&'a dyn ImageRegistry>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        builder: &'a dyn ImageBuilder,
        registry: &'a dyn ImageRegistry,
    ) -> Self {
        Self {
            builder,
            platform: Some(platform),
            registry: Some(registry),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An orchestrator with no cloud access, enough for `build`.
    pub fn local(builder: &'a dyn ImageBuilder) -> Self {
        Self {
            builder,
            platform: None,
            registry: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn platform(&self) -> Result<&'a dyn Platform> {
        self.platform
            .ok_or(BossError::MissingConfig("platform client"))
    }

    fn registry(&self) -> Result<&'a dyn ImageRegistry> {
        self.registry
            .ok_or(BossError::MissingConfig("image registry"))
    }

    /// Share a flag that, once set, stops the run at the next step boundary.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, request: &DeployRequest) -> Result<DeployReport> {
        let target = request.preflight()?;

        let mut state = RunState::default();
        if let Some(repo) = &request.repository {
            state.bindings.bind(Placeholder::Repository, repo.as_str());
        }
        if let Some(tag) = &request.release_tag {
            state.bindings.bind(Placeholder::ReleaseTag, tag.as_str());
        }

        let mut records = Vec::new();
        for &step in request.operation.steps() {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!(%step, "cancelled");
                return Err(BossError::Cancelled(step));
            }

            let started = Instant::now();
            tracing::info!(%step, "step started");
            let outcome = self
                .execute(step, request, &target, &mut state)
                .await
                .map_err(|e| e.in_step(step))?;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (skipped, detail) = match outcome {
                Outcome::Done(d) => (false, d),
                Outcome::Skipped(d) => (true, d),
            };
            tracing::info!(%step, duration_ms, skipped, detail = %detail, "step finished");
            records.push(StepRecord {
                step,
                duration_ms,
                skipped,
                detail,
            });
        }

        Ok(DeployReport {
            operation: request.operation,
            release_tag: state
                .bindings
                .get(Placeholder::ReleaseTag)
                .map(str::to_string),
            image: state.image,
            task_revision: state.revision,
            service: state.reconciled,
            steps: records,
        })
    }

    async fn execute(
        &self,
        step: Step,
        request: &DeployRequest,
        target: &Target,
        state: &mut RunState,
    ) -> Result<Outcome> {
        match step {
            Step::BuildImage => {
                let spec = build_spec(request, target)?;
                let outcome = ImagePublisher::local(self.builder)
                    .build_only(&spec)
                    .await?;
                state.image = Some(outcome);
                Ok(Outcome::Done(format!("built {}", spec.image)))
            }

            Step::PublishImage => {
                let spec = build_spec(request, target)?;
                let repository = request
                    .repository
                    .as_deref()
                    .ok_or(BossError::MissingConfig("repository"))?;
                let tag = request.release_tag.clone().unwrap_or_else(ReleaseTag::generate);
                let outcome = ImagePublisher::new(self.builder, self.registry()?)
                    .publish(&spec, repository, &tag)
                    .await?;
                state.bindings.bind(Placeholder::ReleaseTag, tag.as_str());
                state.image = Some(outcome);
                Ok(Outcome::Done(match outcome {
                    PublishOutcome::AlreadyPublished => {
                        format!("{repository}:{tag} already published")
                    }
                    _ => format!("pushed {repository}:{tag}"),
                }))
            }

            Step::LookupReleaseTag => self.lookup_release_tag(request, target, state).await,

            Step::ResolveTask | Step::ResolveService => {
                let kind = step.template().unwrap_or(TemplateKind::Task);
                let mut template = request
                    .template(kind)
                    .cloned()
                    .ok_or(BossError::MissingConfig("template"))?;
                if kind == TemplateKind::Service {
                    if let Some(count) = request.desired_count {
                        template = template.with_override("desiredCount", Value::from(count));
                    }
                }
                let resolved = resolve::resolve(&template, &state.bindings)?;
                let detail = format!("resolved {}", template.source().display());
                match kind {
                    TemplateKind::Task => state.task = Some(resolved),
                    TemplateKind::Service => state.service = Some(resolved),
                }
                Ok(Outcome::Done(detail))
            }

            Step::RegisterTask => {
                let family = family(target)?;
                let document = state
                    .task
                    .as_ref()
                    .ok_or(BossError::MissingConfig("resolved task document"))?;
                let revision = TaskRegistrar::new(self.platform()?, family)
                    .register(document)
                    .await?;
                state
                    .bindings
                    .bind(Placeholder::TaskRev, revision.revision.to_string());
                let detail = format!("registered {}", revision.family_revision());
                state.revision = Some(revision);
                Ok(Outcome::Done(detail))
            }

            Step::LookupTaskRevision => {
                if state.bindings.contains(Placeholder::TaskRev) {
                    return Ok(Outcome::Skipped("task revision already bound".into()));
                }
                if !request.references(TemplateKind::Service, Placeholder::TaskRev) {
                    return Ok(Outcome::Skipped(
                        "service template pins its task definition".into(),
                    ));
                }
                let family = family(target)?;
                let latest = TaskRegistrar::new(self.platform()?, family)
                    .latest()
                    .await?
                    .ok_or(BossError::MissingConfig(
                        "task revision (the family has no registered revisions)",
                    ))?;
                state
                    .bindings
                    .bind(Placeholder::TaskRev, latest.revision.revision.to_string());
                let detail = format!("using {}", latest.revision.family_revision());
                state.revision = Some(latest.revision);
                Ok(Outcome::Done(detail))
            }

            Step::ReconcileService => {
                let (Some(cluster), Some(service_name)) = (&target.cluster, &target.service_name)
                else {
                    return Err(BossError::MissingConfig("cluster"));
                };
                let document = state
                    .service
                    .as_ref()
                    .ok_or(BossError::MissingConfig("resolved service document"))?;
                let reconciled = ServiceReconciler::new(self.platform()?, request.stabilize)
                    .reconcile(cluster, service_name, document)
                    .await?;
                let detail = format!(
                    "{} {service_name} in {cluster} is stable ({} running)",
                    if reconciled.created { "created" } else { "updated" },
                    reconciled.running_count
                );
                state.reconciled = Some(reconciled);
                Ok(Outcome::Done(detail))
            }
        }
    }

    async fn lookup_release_tag(
        &self,
        request: &DeployRequest,
        target: &Target,
        state: &mut RunState,
    ) -> Result<Outcome> {
        let tag = match state.bindings.get(Placeholder::ReleaseTag) {
            Some(tag) => tag.to_string(),
            None => {
                if !request.references(TemplateKind::Task, Placeholder::ReleaseTag) {
                    return Ok(Outcome::Skipped(
                        "task template does not use a release tag".into(),
                    ));
                }
                let template = request
                    .task_template
                    .as_ref()
                    .ok_or(BossError::MissingConfig("task template"))?;
                let family = family(target)?;
                let latest = TaskRegistrar::new(self.platform()?, family)
                    .latest()
                    .await?
                    .ok_or(BossError::MissingConfig(
                        "release tag (no registered revision to reuse one from)",
                    ))?;
                let tag = registrar::release_tag_from(template, &latest).ok_or(
                    BossError::MissingConfig("release tag (latest revision has no tagged image)"),
                )?;
                state.bindings.bind(Placeholder::ReleaseTag, tag.as_str());
                tag
            }
        };

        if let Some(repository) = &request.repository {
            if !self.registry()?.has_tag(repository, &tag).await? {
                return Err(BossError::TagNotFound {
                    repository: repository.clone(),
                    tag,
                });
            }
        }
        Ok(Outcome::Done(format!("reusing release tag {tag}")))
    }
}

fn family(target: &Target) -> Result<&str> {
    target
        .family
        .as_deref()
        .ok_or(BossError::MissingConfig("task family"))
}

fn build_spec(request: &DeployRequest, target: &Target) -> Result<BuildSpec> {
    Ok(BuildSpec {
        context: request.build_context.clone(),
        image: family(target)?.to_string(),
        args: request.build_args.clone(),
    })
}
