use crate::output::print_json;
use boss_core::{git, BossError};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !git::is_repository(root) {
        if json {
            print_json(&serde_json::json!({ "repository": false, "clean": true }))?;
        } else {
            println!("Not a git repository; nothing to check.");
        }
        return Ok(());
    }

    let status = git::status(root)?;
    if json {
        print_json(&serde_json::json!({
            "repository": true,
            "clean": status.is_clean(),
            "unstaged": status.unstaged,
            "staged": status.staged,
        }))?;
    } else if status.is_clean() {
        println!("Working tree is clean.");
    } else {
        for path in &status.unstaged {
            println!("  modified:  {path}");
        }
        for path in &status.staged {
            println!("  staged:    {path}");
        }
    }

    if status.is_clean() {
        Ok(())
    } else {
        Err(BossError::DirtyWorkingTree.into())
    }
}
