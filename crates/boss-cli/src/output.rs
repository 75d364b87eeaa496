use boss_core::orchestrator::DeployReport;
use boss_core::publisher::PublishOutcome;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    println!("{}", pad(headers.iter().copied(), &widths));
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));
    for row in &rows {
        println!("{}", pad(row.iter().map(String::as_str), &widths));
    }
}

fn pad<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:w$}"))
        .collect();
    line.join("  ").trim_end().to_string()
}

/// Print what a pipeline run did, one row per step followed by a summary.
pub fn print_report(report: &DeployReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    let rows = report
        .steps
        .iter()
        .map(|s| {
            vec![
                s.step.to_string(),
                if s.skipped { "skipped" } else { "done" }.to_string(),
                format!("{:.1}s", s.duration_ms as f64 / 1000.0),
                s.detail.clone(),
            ]
        })
        .collect();
    print_table(&["STEP", "STATUS", "TIME", "DETAIL"], rows);
    println!();

    if let Some(tag) = &report.release_tag {
        println!("Release:  {tag}");
    }
    if let Some(image) = report.image {
        let label = match image {
            PublishOutcome::Built => "built locally",
            PublishOutcome::Pushed => "built and pushed",
            PublishOutcome::AlreadyPublished => "already in the registry",
        };
        println!("Image:    {label}");
    }
    if let Some(rev) = &report.task_revision {
        println!("Task:     {}", rev.family_revision());
    }
    if let Some(svc) = &report.service {
        println!(
            "Service:  {}/{} {} ({}/{} running){}",
            svc.cluster,
            svc.service_name,
            svc.task_definition.as_deref().unwrap_or("-"),
            svc.running_count,
            svc.desired_count,
            if svc.created { ", created" } else { "" },
        );
    }
    println!("{} finished.", report.operation);
    Ok(())
}
