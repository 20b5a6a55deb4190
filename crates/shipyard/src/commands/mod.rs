pub mod plan;
pub mod run;
pub mod up;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use shipyard_core::DeployConfig;
use shipyard_deployer::Deployer;
use shipyard_exec::OpenSshFactory;

/// Read a deployment file, apply `SHIPYARD_*` overrides and build the
/// deployer over OpenSSH sessions.
pub fn load(file: &Path) -> anyhow::Result<Deployer> {
    let mut config = DeployConfig::from_file(file)
        .with_context(|| format!("failed to read deployment file {}", file.display()))?;
    config.settings.apply_env_overrides();
    let deployer = Deployer::from_config(&config, Arc::new(OpenSshFactory))?;
    Ok(deployer)
}

/// Tear the fleet down. Unless strict teardown is configured, failures are
/// reported and the remaining containers are still destroyed.
pub async fn teardown(deployer: &mut Deployer) -> anyhow::Result<()> {
    let strict = deployer.context().settings.strict_teardown;
    let report = deployer.destroy(!strict).await?;
    for name in &report.destroyed {
        println!("✓ destroyed {name}");
    }
    for (name, e) in &report.failures {
        warn!(container = %name, error = %e, "container left behind");
        eprintln!("✗ failed to destroy {name}: {e}");
    }
    Ok(())
}
