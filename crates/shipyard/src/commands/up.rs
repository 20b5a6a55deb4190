use std::path::Path;

use tracing::error;

pub async fn up(file: &Path) -> anyhow::Result<()> {
    let mut deployer = super::load(file)?;

    if let Err(e) = deployer.deploy().await {
        error!(error = %e, "deployment failed, tearing down");
        super::teardown(&mut deployer).await?;
        return Err(e.into());
    }

    for container in deployer.containers() {
        println!("✓ {container} is {}", container.state());
    }
    if deployer.ensemble().is_formed() {
        println!("✓ ensemble: {}", deployer.ensemble().members().join(" "));
    }
    Ok(())
}
