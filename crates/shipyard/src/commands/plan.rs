use std::path::Path;

pub fn plan(file: &Path, json: bool) -> anyhow::Result<()> {
    let deployer = super::load(file)?;
    let plan = deployer.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for (i, batch) in plan.batches.iter().enumerate() {
        println!("batch {}: {}", i + 1, batch.join(", "));
    }
    println!();
    for container in &plan.containers {
        match &container.parent {
            Some(parent) => println!(
                "  {} ({}) on {} under {parent}",
                container.name, container.kind, container.host
            ),
            None => println!("  {} ({}) on {}", container.name, container.kind, container.host),
        }
    }
    if !plan.ensemble.is_empty() {
        println!();
        println!("ensemble: {}", plan.ensemble.join(" "));
    }
    Ok(())
}
