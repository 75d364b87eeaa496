use crate::cmd::args::{BuildArgs, Global, Project, ServiceArgs, TemplateArgs};
use crate::cmd::aws::Clients;
use crate::output;
use anyhow::{anyhow, Context};
use boss_core::config::split_build_args;
use boss_core::docker::Docker;
use boss_core::ecs::{EcrRegistry, EcsPlatform};
use boss_core::git;
use boss_core::orchestrator::{DeployReport, DeployRequest, Orchestrator};
use boss_core::pipeline::Operation;
use boss_core::publisher::ReleaseTag;
use boss_core::reconciler::ReconcileOptions;
use boss_core::template::TemplateKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct PipelineArgs {
    pub operation: Operation,
    pub templates: TemplateArgs,
    pub service: ServiceArgs,
    pub build: BuildArgs,
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub allow_dirty: bool,
    pub desired_count: Option<u32>,
}

impl PipelineArgs {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            templates: TemplateArgs::default(),
            service: ServiceArgs::default(),
            build: BuildArgs::default(),
            repository: None,
            tag: None,
            allow_dirty: false,
            desired_count: None,
        }
    }
}

pub fn run(root: &Path, global: &Global, args: PipelineArgs) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    let op = args.operation;
    let mut request = request(&project, args.operation, &args)?;

    // Everything local is checked before git or AWS are touched.
    request.preflight()?;

    if op.requires_clean_tree() {
        if args.allow_dirty {
            tracing::warn!("deploying with uncommitted changes");
        } else {
            git::ensure_clean(root)?;
        }
    }

    if op == Operation::Deploy {
        let tag = request
            .release_tag
            .get_or_insert_with(ReleaseTag::generate)
            .clone();
        let outcome = git::tag_release(root, tag.as_str())?;
        tracing::debug!(?outcome, %tag, "git tag");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(execute(&project, global, &request))?;
    output::print_report(&report, global.json)
}

fn request(project: &Project, op: Operation, args: &PipelineArgs) -> anyhow::Result<DeployRequest> {
    let config = &project.config;
    let needed = op.templates();
    let task_template =
        project.template(TemplateKind::Task, &args.templates, needed.contains(&TemplateKind::Task))?;
    let service_template = project.template(
        TemplateKind::Service,
        &args.templates,
        needed.contains(&TemplateKind::Service),
    )?;

    let release_tag = args
        .tag
        .as_deref()
        .map(ReleaseTag::new)
        .transpose()?;

    let build_context = args
        .build
        .context
        .as_ref()
        .map(|c| project.root.join(c))
        .unwrap_or_else(|| config.build_context_path(&project.root));
    let build_args = args
        .build
        .build_args
        .as_deref()
        .map(split_build_args)
        .unwrap_or_else(|| config.build_arg_list());

    let timeout = args.service.timeout.unwrap_or(config.stabilize.timeout_secs);
    let poll = args
        .service
        .poll_interval
        .unwrap_or(config.stabilize.poll_interval_secs);

    Ok(DeployRequest {
        operation: op,
        task_template,
        service_template,
        repository: args.repository.clone().or_else(|| config.repository.clone()),
        cluster: args.service.cluster.clone().or_else(|| config.cluster.clone()),
        service_name: args
            .service
            .service_name
            .clone()
            .or_else(|| config.service_name.clone()),
        task_family: args
            .templates
            .family
            .clone()
            .or_else(|| config.task_family.clone()),
        release_tag,
        desired_count: args.desired_count,
        build_context,
        build_args,
        stabilize: ReconcileOptions {
            poll_interval: Duration::from_secs(poll.max(1)),
            timeout: Duration::from_secs(timeout),
        },
    })
}

fn docker() -> anyhow::Result<Docker> {
    Docker::detect().ok_or_else(|| anyhow!("docker not found on PATH"))
}

async fn execute(
    project: &Project,
    global: &Global,
    request: &DeployRequest,
) -> anyhow::Result<DeployReport> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; stopping after the current step");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let op = request.operation;
    if op == Operation::Build {
        let docker = docker()?;
        return Orchestrator::local(&docker)
            .with_cancel_flag(cancel)
            .run(request)
            .await
            .with_context(|| format!("{op} failed"));
    }

    let clients = Clients::connect(global, &project.config)?;
    // Only deploy builds and pushes; the others never invoke docker.
    let docker = if op == Operation::Deploy {
        docker()?
    } else {
        Docker::new("docker")
    };
    let platform = EcsPlatform::new(clients.ecs);
    let registry = EcrRegistry::new(clients.ecr, docker.clone());

    Orchestrator::new(&platform, &docker, &registry)
        .with_cancel_flag(cancel)
        .run(request)
        .await
        .with_context(|| format!("{op} failed"))
}
