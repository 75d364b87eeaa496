use crate::cmd::args::{Project, TemplateArgs};
use crate::output::print_json;
use boss_core::resolve::Placeholder;
use boss_core::template::TemplateKind;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Checked {
    kind: String,
    path: String,
    family: Option<String>,
    placeholders: Vec<Placeholder>,
}

pub fn run(root: &Path, args: &TemplateArgs, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;

    let mut checked = Vec::new();
    for kind in [TemplateKind::Task, TemplateKind::Service] {
        let Some(template) = project.template(kind, args, true)? else {
            continue;
        };
        template.validate()?;
        checked.push(Checked {
            kind: kind.to_string(),
            path: template.source().display().to_string(),
            family: template.family().map(str::to_string),
            placeholders: template.placeholders().into_iter().collect(),
        });
    }

    if json {
        return print_json(&serde_json::json!({ "ok": true, "templates": checked }));
    }
    for c in &checked {
        let markers: Vec<String> = c
            .placeholders
            .iter()
            .map(|p| p.marker().to_string())
            .collect();
        println!(
            "{:<8} {}  family={}  placeholders=[{}]",
            c.kind,
            c.path,
            c.family.as_deref().unwrap_or("-"),
            markers.join(", ")
        );
    }
    println!("Everything looks good.");
    Ok(())
}
