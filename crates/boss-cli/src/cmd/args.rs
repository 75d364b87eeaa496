use anyhow::Context;
use boss_core::config::Config;
use boss_core::template::{Template, TemplateKind};
use clap::Args;
use std::path::{Path, PathBuf};

/// Flags shared by every command.
pub struct Global {
    pub json: bool,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TemplateArgs {
    /// Task definition template (default: task-def.json)
    #[arg(long, value_name = "PATH")]
    pub task_file: Option<PathBuf>,

    /// Service template (default: service.json)
    #[arg(long, value_name = "PATH")]
    pub service_file: Option<PathBuf>,

    /// Task family (default: from the task template)
    #[arg(long)]
    pub family: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    /// Cluster name (default: the service template's `cluster`)
    #[arg(long, env = "ECS_BOSS_CLUSTER")]
    pub cluster: Option<String>,

    /// Service name (default: the service template's `serviceName`)
    #[arg(long)]
    pub service_name: Option<String>,

    /// Seconds to wait for the service to stabilize
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds between status checks while waiting
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Docker build context (default: project root)
    #[arg(long, value_name = "DIR")]
    pub context: Option<PathBuf>,

    /// Extra `docker build` arguments, split on whitespace
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub build_args: Option<String>,
}

/// The project root and its `ecs-boss.yaml`.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load ecs-boss.yaml")?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    fn template_path(&self, kind: TemplateKind, args: &TemplateArgs) -> PathBuf {
        match kind {
            TemplateKind::Task => args
                .task_file
                .as_ref()
                .map(|p| self.root.join(p))
                .unwrap_or_else(|| self.config.task_path(&self.root)),
            TemplateKind::Service => args
                .service_file
                .as_ref()
                .map(|p| self.root.join(p))
                .unwrap_or_else(|| self.config.service_path(&self.root)),
        }
    }

    /// Load a template. Optional templates that don't exist yield `None`.
    pub fn template(
        &self,
        kind: TemplateKind,
        args: &TemplateArgs,
        required: bool,
    ) -> anyhow::Result<Option<Template>> {
        let path = self.template_path(kind, args);
        if !required && !path.exists() {
            return Ok(None);
        }
        Ok(Some(Template::load(kind, &path)?))
    }

    /// Family from flag, config, then either template.
    pub fn family(&self, args: &TemplateArgs) -> anyhow::Result<Option<String>> {
        if let Some(f) = args.family.clone().or_else(|| self.config.task_family.clone()) {
            return Ok(Some(f));
        }
        for kind in [TemplateKind::Task, TemplateKind::Service] {
            if let Some(t) = self.template(kind, args, false)? {
                if let Some(f) = t.family() {
                    return Ok(Some(f.to_string()));
                }
            }
        }
        Ok(None)
    }
}
