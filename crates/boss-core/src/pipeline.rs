//! Operations and the ordered step lists they run.
//!
//! Each operation is a static declaration: the orchestrator walks the list in
//! order and nothing else decides what runs.

use crate::resolve::Placeholder;
use crate::template::TemplateKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Build,
    Deploy,
    UpdateTask,
    UpdateService,
}

impl Operation {
    pub fn steps(self) -> &'static [Step] {
        match self {
            Operation::Build => &[Step::BuildImage],
            Operation::Deploy => &[
                Step::PublishImage,
                Step::ResolveTask,
                Step::RegisterTask,
                Step::ResolveService,
                Step::ReconcileService,
            ],
            Operation::UpdateTask => &[
                Step::LookupReleaseTag,
                Step::ResolveTask,
                Step::RegisterTask,
                Step::ResolveService,
                Step::ReconcileService,
            ],
            Operation::UpdateService => &[
                Step::LookupTaskRevision,
                Step::ResolveService,
                Step::ReconcileService,
            ],
        }
    }

    /// Templates this operation resolves, in pipeline order.
    pub fn templates(self) -> Vec<TemplateKind> {
        self.steps().iter().filter_map(|s| s.template()).collect()
    }

    /// Operations that change source-controlled releases refuse a dirty tree.
    pub fn requires_clean_tree(self) -> bool {
        matches!(self, Operation::Deploy | Operation::UpdateTask)
    }

    pub fn reconciles(self) -> bool {
        self.steps().contains(&Step::ReconcileService)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Build => "build",
            Operation::Deploy => "deploy",
            Operation::UpdateTask => "update-task",
            Operation::UpdateService => "update-service",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Build the image locally without tagging or pushing.
    BuildImage,
    /// Build, tag and push; binds `RELEASE_TAG`.
    PublishImage,
    /// Recover the release tag from the latest task revision when one is needed.
    LookupReleaseTag,
    ResolveTask,
    /// Binds `TASK_REV`.
    RegisterTask,
    /// Bind `TASK_REV` to the latest registered revision when one is needed.
    LookupTaskRevision,
    ResolveService,
    ReconcileService,
}

impl Step {
    /// The placeholder this step binds, if any.
    pub fn provides(self) -> Option<Placeholder> {
        match self {
            Step::PublishImage | Step::LookupReleaseTag => Some(Placeholder::ReleaseTag),
            Step::RegisterTask | Step::LookupTaskRevision => Some(Placeholder::TaskRev),
            _ => None,
        }
    }

    /// The template this step resolves, if any.
    pub fn template(self) -> Option<TemplateKind> {
        match self {
            Step::ResolveTask => Some(TemplateKind::Task),
            Step::ResolveService => Some(TemplateKind::Service),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::BuildImage => "build-image",
            Step::PublishImage => "publish-image",
            Step::LookupReleaseTag => "lookup-release-tag",
            Step::ResolveTask => "resolve-task",
            Step::RegisterTask => "register-task",
            Step::LookupTaskRevision => "lookup-task-revision",
            Step::ResolveService => "resolve-service",
            Step::ReconcileService => "reconcile-service",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
