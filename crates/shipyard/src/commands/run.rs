use std::path::Path;

use tracing::info;

use shipyard_deployer::Deployer;

pub async fn run(
    file: &Path,
    command: Option<&str>,
    on: Option<&str>,
    keep: bool,
) -> anyhow::Result<()> {
    let mut deployer = super::load(file)?;
    let outcome = deploy_and_execute(&mut deployer, command, on).await;

    if keep {
        info!("keeping containers");
    } else {
        super::teardown(&mut deployer).await?;
    }
    outcome
}

async fn deploy_and_execute(
    deployer: &mut Deployer,
    command: Option<&str>,
    on: Option<&str>,
) -> anyhow::Result<()> {
    deployer.deploy().await?;

    let Some(command) = command else {
        return Ok(());
    };
    let target = match on {
        Some(name) => name.to_string(),
        None => deployer.root()?.name().to_string(),
    };
    info!(container = %target, %command, "executing command");
    let output = deployer.execute_command(&target, command).await?;
    println!("{output}");
    Ok(())
}
