//! Staging and unpacking the installable middleware archive.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use shipyard_exec::{ExecError, RemoteExecutor};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("archive {archive} did not unpack into a directory")]
    Unpack { archive: String },

    #[error("staging artifact failed: {0}")]
    Exec(#[from] ExecError),
}

/// Places the installable archive on a remote host.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Stage the archive inside `dir` and return its remote path.
    async fn stage(&self, exec: &dyn RemoteExecutor, dir: &str) -> Result<String, ArtifactError>;
}

/// Downloads the archive on the remote host with `curl`.
#[derive(Debug, Clone, Default)]
pub struct UrlArtifactProvider {
    url: Option<String>,
}

impl UrlArtifactProvider {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }
}

#[async_trait]
impl ArtifactProvider for UrlArtifactProvider {
    async fn stage(&self, exec: &dyn RemoteExecutor, dir: &str) -> Result<String, ArtifactError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ArtifactError::NotFound("no artifact url configured".to_string()))?;
        let file = url.rsplit('/').next().unwrap_or(url);
        let archive = format!("{dir}/{file}");

        info!(session = %exec.target(), %url, "staging artifact");
        match exec
            .execute_command(&format!("curl -sSfL -o {archive} {url}"))
            .await
        {
            Ok(_) => Ok(archive),
            Err(ExecError::Command { reason, .. }) if reason.contains("404") => {
                Err(ArtifactError::NotFound(url.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Unzip `archive` into `dir` and return the product home it created.
pub async fn unpack(
    exec: &dyn RemoteExecutor,
    archive: &str,
    dir: &str,
) -> Result<String, ArtifactError> {
    exec.execute_command(&format!("unzip -q -o {archive} -d {dir}"))
        .await?;
    let listing = exec.execute_command(&format!("ls -d {dir}/*/")).await?;
    let home = listing
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_end_matches('/').to_string())
        .ok_or_else(|| ArtifactError::Unpack {
            archive: archive.to_string(),
        })?;
    debug!(%archive, %home, "archive unpacked");
    Ok(home)
}
