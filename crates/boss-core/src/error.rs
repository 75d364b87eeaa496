use crate::pipeline::Step;
use crate::platform::ServiceStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BossError {
    #[error("invalid {template} template: {reason}")]
    TemplateInvalid { template: String, reason: String },

    #[error("{template} template references unbound placeholder(s): {}", .tokens.join(", "))]
    UnboundPlaceholder {
        template: String,
        tokens: Vec<String>,
    },

    #[error("value bound to {token} contains a placeholder marker: '{value}'")]
    InvalidBinding { token: String, value: String },

    #[error("invalid release tag '{0}': use letters, digits, '_', '.' or '-' (max 128)")]
    InvalidReleaseTag(String),

    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("image build failed: {0}")]
    BuildFailure(String),

    #[error("image push failed: {0}")]
    PushFailure(String),

    #[error("image tag '{tag}' not found in {repository}; push an image with that tag first")]
    TagNotFound { repository: String, tag: String },

    #[error("task definition for family '{family}' rejected: {message}\nsubmitted document:\n{document}")]
    RegistrationRejected {
        family: String,
        message: String,
        document: String,
    },

    #[error("service '{service}' in cluster '{cluster}' rejected: {message}")]
    ReconcileRejected {
        cluster: String,
        service: String,
        message: String,
    },

    #[error(
        "service '{service}' in cluster '{cluster}' did not stabilize within {waited_secs}s ({})",
        last_seen(.last.as_ref())
    )]
    ReconcileTimeout {
        cluster: String,
        service: String,
        waited_secs: u64,
        /// `None` when no status call answered before the deadline.
        last: Option<ServiceStatus>,
    },

    #[error("uncommitted changes in the working tree: commit or stash them first")]
    DirtyWorkingTree,

    #[error("git error: {0}")]
    Git(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("cancelled before step '{0}'")]
    Cancelled(Step),

    #[error("step '{step}' failed")]
    Step {
        step: Step,
        #[source]
        source: Box<BossError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BossError {
    /// Attach the pipeline step that produced this error.
    pub fn in_step(self, step: Step) -> Self {
        match self {
            e @ (BossError::Step { .. } | BossError::Cancelled(_)) => e,
            e => BossError::Step {
                step,
                source: Box::new(e),
            },
        }
    }

    /// The step this error was raised in, if it came out of the pipeline.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            BossError::Step { step, .. } | BossError::Cancelled(step) => Some(*step),
            _ => None,
        }
    }

    /// The error with any step wrapper removed.
    pub fn root(&self) -> &BossError {
        match self {
            BossError::Step { source, .. } => source.root(),
            e => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, BossError>;

fn last_seen(status: Option<&ServiceStatus>) -> String {
    match status {
        Some(s) => format!(
            "desired {}, running {}, deployment in progress: {}",
            s.desired_count, s.running_count, s.deployment_in_progress
        ),
        None => "no status reported".to_string(),
    }
}
