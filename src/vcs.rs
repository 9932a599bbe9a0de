//! Git commit/push of indexed data
//!
//! Everything here is a no-op when git is disabled in the config.

use crate::config::GitConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{error, info, warn};

#[async_trait]
pub trait VersionControl: Send + Sync {
    fn enabled(&self) -> bool;

    /// Sets the bot identity for later commits
    async fn configure(&self);

    /// Stages and commits everything. `false` when disabled, nothing
    /// changed, or git failed.
    async fn commit(&self, message: &str) -> bool;

    async fn push(&self) -> bool;
}

/// Shells out to the `git` binary
pub struct GitCli {
    config: GitConfig,
}

impl GitCli {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn configure(&self) {
        if !self.config.enabled {
            return;
        }
        let name = self.git(&["config", "user.name", self.config.bot_name.as_str()]).await;
        let email = self
            .git(&["config", "user.email", self.config.bot_email.as_str()])
            .await;
        match name.and(email) {
            Ok(_) => info!("Git configured for bot commits"),
            Err(e) => warn!("Could not configure git: {e:#}"),
        }
    }

    async fn commit(&self, message: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let status = match self.git(&["status", "--porcelain"]).await {
            Ok(s) => s,
            Err(e) => {
                error!("Error committing changes: {e:#}");
                return false;
            }
        };
        if status.trim().is_empty() {
            info!("No changes to commit");
            return false;
        }

        let result = async {
            self.git(&["add", "."]).await?;
            self.git(&["commit", "-m", message]).await
        }
        .await;

        match result {
            Ok(_) => {
                info!("📝 Changes committed: {}", message);
                true
            }
            Err(e) => {
                error!("Error committing changes: {e:#}");
                false
            }
        }
    }

    async fn push(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.git(&["push"]).await {
            Ok(_) => {
                info!("⬆️ Changes pushed to remote repository");
                true
            }
            Err(e) => {
                error!("Error pushing changes: {e:#}");
                false
            }
        }
    }
}

/// Records commit messages instead of running git
#[derive(Debug, Default)]
pub struct RecordingVcs {
    enabled: bool,
    commits: Mutex<Vec<String>>,
    pushes: Mutex<usize>,
}

impl RecordingVcs {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().clone()
    }

    pub fn pushes(&self) -> usize {
        *self.pushes.lock()
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn configure(&self) {}

    async fn commit(&self, message: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.commits.lock().push(message.to_string());
        true
    }

    async fn push(&self) -> bool {
        if !self.enabled {
            return false;
        }
        *self.pushes.lock() += 1;
        true
    }
}
