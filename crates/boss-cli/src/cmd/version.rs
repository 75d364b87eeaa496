use crate::output::print_json;

pub fn run(json: bool) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        print_json(&serde_json::json!({ "name": "ecs-boss", "version": version }))
    } else {
        println!("ecs-boss {version}");
        Ok(())
    }
}
