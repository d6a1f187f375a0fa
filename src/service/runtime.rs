//! Container runtime seam.
//!
//! [`ModelServiceController`](super::ModelServiceController) only needs three
//! operations from the runtime: inspect, start and stop by container name.
//! They live behind the [`ContainerRuntime`] trait so tests can substitute
//! an in-memory fake, and so `podman` or a remote daemon can be plugged in.
//! [`DockerCli`] is the stock implementation and shells out to the CLI.

use async_trait::async_trait;
use std::fmt;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Seconds `docker stop` waits before killing a competing container.
pub const STOP_GRACE_SECS: u32 = 15;

/// Failures talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be spawned.
    #[error("Failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime ran but reported failure.
    #[error("'{action}' failed for container '{name}': {detail}")]
    CommandFailed {
        action: &'static str,
        name: String,
        detail: String,
    },
}

/// Lifecycle state of a container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other(String),
}

impl ContainerStatus {
    /// Parse a `{{.State.Status}}` value.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the container may still hold GPU memory and must be stopped
    /// to free it.
    pub fn holds_resources(&self) -> bool {
        !matches!(self, Self::Created | Self::Exited | Self::Dead)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Start/stop/inspect containers by name.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current status, or `None` when no container has this name.
    async fn status(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError>;

    async fn start(&self, name: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;
}

/// [`ContainerRuntime`] backed by the `docker` CLI (or a compatible one).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                binary: self.binary.clone(),
                source,
            })
    }

    fn check(action: &'static str, name: &str, output: Output) -> Result<Output, RuntimeError> {
        if output.status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                action,
                name: name.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn status(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError> {
        let output = self
            .run(&["inspect", "--format", "{{.State.Status}}", name])
            .await?;
        if !output.status.success() {
            // docker says "No such object", podman "no such object".
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("no such") {
                return Ok(None);
            }
        }
        let output = Self::check("inspect", name, output)?;
        Ok(Some(ContainerStatus::parse(&String::from_utf8_lossy(
            &output.stdout,
        ))))
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let output = self.run(&["start", name]).await?;
        Self::check("start", name, output).map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let grace = STOP_GRACE_SECS.to_string();
        let output = self.run(&["stop", "--time", &grace, name]).await?;
        Self::check("stop", name, output).map(|_| ())
    }
}
