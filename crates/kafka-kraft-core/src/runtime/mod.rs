//! Container runtime seam.
//!
//! The bootstrap pipeline only talks to [`ContainerRuntime`]. [`DockerRuntime`]
//! drives a Docker Engine; the `testing` module provides an in-memory
//! implementation.

mod docker;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::NetworkAttachment;
use crate::error::RuntimeResult;

pub use docker::DockerRuntime;

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRequest {
    /// Image reference.
    pub image: String,
    /// Entrypoint replacing the image's own; the image default when empty.
    pub entrypoint: Vec<String>,
    /// Arguments passed to the entrypoint.
    pub cmd: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// TCP ports to expose and publish on random host ports.
    pub exposed_ports: Vec<u16>,
    /// Private network to join.
    pub network: Option<NetworkAttachment>,
}

/// State of a container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Hostname of the container on its networks.
    pub hostname: String,
    /// Whether the main process is running.
    pub running: bool,
    /// Container TCP port to host port.
    pub ports: BTreeMap<u16, u16>,
}

impl ContainerInspection {
    /// Host port published for `container_port`.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }
}

/// Result of running a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A container returned by [`ContainerRuntime::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    pub running: bool,
}

/// Operations the bootstrapper needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Host through which published ports are reachable.
    fn host(&self) -> String;

    /// Make sure `image` is available locally, pulling it if needed.
    async fn ensure_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create a container and return its id.
    async fn create(&self, request: &ContainerRequest) -> RuntimeResult<String>;

    /// Start a created container.
    async fn start(&self, id: &str) -> RuntimeResult<()>;

    /// Stop a running container.
    async fn stop(&self, id: &str) -> RuntimeResult<()>;

    /// Remove a container and its anonymous volumes.
    async fn remove(&self, id: &str) -> RuntimeResult<()>;

    /// Inspect a container.
    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerInspection>;

    /// Run `cmd` inside a running container and wait for it to exit.
    async fn exec(&self, id: &str, cmd: &[String]) -> RuntimeResult<ExecOutput>;

    /// Write `content` to `path` inside the container with file `mode`.
    async fn copy_to_container(
        &self,
        id: &str,
        content: &[u8],
        path: &str,
        mode: u32,
    ) -> RuntimeResult<()>;

    /// Combined stdout and stderr of the container so far.
    ///
    /// With `since` (Unix seconds), only lines logged at or after that second.
    async fn logs(&self, id: &str, since: Option<i64>) -> RuntimeResult<String>;

    /// Containers, running or not, carrying every label in `labels`.
    async fn list(&self, labels: &BTreeMap<String, String>) -> RuntimeResult<Vec<ContainerSummary>>;

    /// Create a bridge network and return its id.
    async fn create_network(&self, name: &str) -> RuntimeResult<String>;

    /// Remove a network by name or id.
    async fn remove_network(&self, name: &str) -> RuntimeResult<()>;
}
