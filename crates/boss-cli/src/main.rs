mod cmd;
mod output;
mod root;

use boss_core::pipeline::Operation;
use clap::{Parser, Subcommand};
use cmd::args::{BuildArgs, Global, ServiceArgs, TemplateArgs};
use cmd::pipeline::PipelineArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ecs-boss",
    about = "Build, push and deploy container images to Amazon ECS",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from ecs-boss.yaml, Dockerfile or .git/)
    #[arg(long, global = true, env = "ECS_BOSS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// AWS region (default: ecs-boss.yaml, then AWS_DEFAULT_REGION, then us-east-1)
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS access key id
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the image locally; nothing is pushed
    Build {
        #[command(flatten)]
        templates: TemplateArgs,
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Build, push, register a task revision and update the service
    Deploy {
        #[command(flatten)]
        templates: TemplateArgs,
        #[command(flatten)]
        service: ServiceArgs,
        #[command(flatten)]
        build: BuildArgs,
        /// Registry repository URI
        #[arg(long, env = "REPOSITORY")]
        repository: Option<String>,
        /// Release tag (default: UTC timestamp). Skips the build if the registry has it
        #[arg(long)]
        tag: Option<String>,
        /// Deploy even with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
    },

    /// Register a task revision from an already pushed image and update the service
    UpdateTask {
        #[command(flatten)]
        templates: TemplateArgs,
        #[command(flatten)]
        service: ServiceArgs,
        /// Registry repository URI
        #[arg(long, env = "REPOSITORY")]
        repository: Option<String>,
        /// Image tag to use (default: the tag of the latest registered revision)
        #[arg(long)]
        tag: Option<String>,
        /// Run even with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
    },

    /// Apply the service template using the current task revision
    UpdateService {
        #[command(flatten)]
        templates: TemplateArgs,
        #[command(flatten)]
        service: ServiceArgs,
        /// Registry repository URI
        #[arg(long, env = "REPOSITORY")]
        repository: Option<String>,
    },

    /// Update the service with a new desired count
    ScaleService {
        /// Number of tasks to run
        count: u32,
        #[command(flatten)]
        templates: TemplateArgs,
        #[command(flatten)]
        service: ServiceArgs,
        /// Registry repository URI
        #[arg(long, env = "REPOSITORY")]
        repository: Option<String>,
    },

    /// Check both templates locally without calling AWS
    Validate {
        #[command(flatten)]
        templates: TemplateArgs,
    },

    /// Fail if the git working tree has uncommitted changes
    CheckGit,

    /// Create the image repository for the task family if it does not exist
    Setup {
        #[command(flatten)]
        templates: TemplateArgs,
    },

    /// Print the version
    Version,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Validate { .. } | Commands::Version | Commands::CheckGit => {
            tracing::Level::WARN
        }
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let global = Global {
        json: cli.json,
        region: cli.region,
        access_key_id: cli.access_key_id,
        secret_access_key: cli.secret_access_key,
    };

    let result = match cli.command {
        Commands::Build { templates, build } => cmd::pipeline::run(
            &root,
            &global,
            PipelineArgs {
                templates,
                build,
                ..PipelineArgs::new(Operation::Build)
            },
        ),
        Commands::Deploy {
            templates,
            service,
            build,
            repository,
            tag,
            allow_dirty,
        } => cmd::pipeline::run(
            &root,
            &global,
            PipelineArgs {
                templates,
                service,
                build,
                repository,
                tag,
                allow_dirty,
                ..PipelineArgs::new(Operation::Deploy)
            },
        ),
        Commands::UpdateTask {
            templates,
            service,
            repository,
            tag,
            allow_dirty,
        } => cmd::pipeline::run(
            &root,
            &global,
            PipelineArgs {
                templates,
                service,
                repository,
                tag,
                allow_dirty,
                ..PipelineArgs::new(Operation::UpdateTask)
            },
        ),
        Commands::UpdateService {
            templates,
            service,
            repository,
        } => cmd::pipeline::run(
            &root,
            &global,
            PipelineArgs {
                templates,
                service,
                repository,
                ..PipelineArgs::new(Operation::UpdateService)
            },
        ),
        Commands::ScaleService {
            count,
            templates,
            service,
            repository,
        } => cmd::pipeline::run(
            &root,
            &global,
            PipelineArgs {
                templates,
                service,
                repository,
                desired_count: Some(count),
                ..PipelineArgs::new(Operation::UpdateService)
            },
        ),
        Commands::Validate { templates } => cmd::validate::run(&root, &templates, global.json),
        Commands::CheckGit => cmd::check_git::run(&root, global.json),
        Commands::Setup { templates } => cmd::setup::run(&root, &global, &templates),
        Commands::Version => cmd::version::run(global.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
