use crate::cmd::args::{Global, Project, TemplateArgs};
use crate::cmd::aws::Clients;
use crate::output::print_json;
use anyhow::anyhow;
use boss_core::config::CONFIG_FILE;
use boss_core::ecs::ensure_repository;
use std::path::Path;

pub fn run(root: &Path, global: &Global, args: &TemplateArgs) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    let family = project.family(args)?.ok_or_else(|| {
        anyhow!("cannot name the repository: pass --family, set task_family in {CONFIG_FILE}, or add a task template")
    })?;
    let clients = Clients::connect(global, &project.config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let (uri, created) = runtime.block_on(ensure_repository(&clients.ecr, &family))?;

    if global.json {
        print_json(&serde_json::json!({
            "family": family,
            "repository": uri,
            "created": created,
        }))?;
    } else {
        if created {
            println!("Created repository {family}.");
        } else {
            println!("Repository {family} already exists.");
        }
        println!("Add this to your environment or {CONFIG_FILE}:");
        println!("REPOSITORY={uri}");
    }
    Ok(())
}
