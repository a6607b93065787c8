//! In-memory container runtime for testing.
//!
//! A lightweight runtime that:
//! - Records every call it receives
//! - Emulates the broker reacting to the startup script
//! - Fails configurable operations

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{
    ContainerInspection, ContainerRequest, ContainerRuntime, ContainerSummary, ExecOutput,
};
use crate::script::STARTER_SCRIPT_PATH;

/// First host port handed out for published container ports.
const FIRST_HOST_PORT: u16 = 49153;

/// Log line the emulated broker writes once it is ready.
pub const READY_LOG_LINE: &str =
    "[2024-01-01 00:00:00,000] INFO [KafkaRaftServer nodeId=1] Kafka Server started (kafka.server.KafkaRaftServer)";

/// How the emulated broker reacts once its startup script is copied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupBehavior {
    /// Logs the readiness line.
    #[default]
    Ready,
    /// Keeps running without ever becoming ready.
    NeverReady,
    /// Exits without becoming ready.
    ExitBeforeReady,
}

/// Runtime operations, used to record calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOperation {
    EnsureImage,
    Create,
    Start,
    Stop,
    Remove,
    Inspect,
    Exec,
    CopyToContainer,
    Logs,
    List,
    CreateNetwork,
    RemoveNetwork,
}

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    /// The operation invoked.
    pub operation: RuntimeOperation,
    /// Container id, image or network name the call targeted.
    pub target: String,
}

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    mode: u32,
}

#[derive(Debug, Clone)]
struct MockContainer {
    request: ContainerRequest,
    hostname: String,
    running: bool,
    ports: BTreeMap<u16, u16>,
    files: BTreeMap<String, MockFile>,
    logs: Vec<(i64, String)>,
}

impl MockContainer {
    fn log(&mut self, line: &str) {
        self.logs.push((unix_now(), format!("{line}\n")));
    }
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    calls: Vec<RuntimeCall>,
    log_windows: Vec<Option<i64>>,
    created: u64,
    next_host_port: u16,
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct MockRuntime {
    host: String,
    behavior: StartupBehavior,
    failures: HashSet<RuntimeOperation>,
    pull_delay: Duration,
    state: Arc<RwLock<MockState>>,
}

impl MockRuntime {
    /// A runtime whose broker becomes ready as soon as its script arrives.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: "localhost".to_string(),
            behavior: StartupBehavior::default(),
            failures: HashSet::new(),
            pull_delay: Duration::ZERO,
            state: Arc::new(RwLock::new(MockState {
                next_host_port: FIRST_HOST_PORT,
                ..MockState::default()
            })),
        }
    }

    /// Set how the emulated broker reacts to its startup script.
    #[must_use]
    pub fn with_startup_behavior(mut self, behavior: StartupBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Make every call of `operation` fail.
    #[must_use]
    pub fn failing(mut self, operation: RuntimeOperation) -> Self {
        self.failures.insert(operation);
        self
    }

    /// Make every image pull take `delay`.
    #[must_use]
    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = delay;
        self
    }

    /// Set the host reported by [`ContainerRuntime::host`].
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.state.read().await.calls.clone()
    }

    /// Get calls filtered by operation.
    pub async fn calls_for(&self, operation: RuntimeOperation) -> Vec<RuntimeCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// The `since` argument of every log request, in call order.
    pub async fn log_windows(&self) -> Vec<Option<i64>> {
        self.state.read().await.log_windows.clone()
    }

    /// Clear all recorded calls.
    pub async fn clear_calls(&self) {
        let mut state = self.state.write().await;
        state.calls.clear();
        state.log_windows.clear();
    }

    /// Number of containers that exist, running or not.
    pub async fn container_count(&self) -> usize {
        self.state.read().await.containers.len()
    }

    /// The request a container was created with.
    pub async fn request(&self, id: &str) -> Option<ContainerRequest> {
        self.state
            .read()
            .await
            .containers
            .get(id)
            .map(|c| c.request.clone())
    }

    /// Content and mode of a file copied into a container.
    pub async fn file(&self, id: &str, path: &str) -> Option<(Vec<u8>, u32)> {
        self.state
            .read()
            .await
            .containers
            .get(id)
            .and_then(|c| c.files.get(path))
            .map(|f| (f.content.clone(), f.mode))
    }

    /// Whether a network exists.
    pub async fn has_network(&self, name: &str) -> bool {
        self.state.read().await.networks.contains(name)
    }

    /// Whether an image was pulled.
    pub async fn has_image(&self, image: &str) -> bool {
        self.state.read().await.images.contains(image)
    }

    /// Record a call and fail it if configured to.
    async fn record(&self, operation: RuntimeOperation, target: &str) -> RuntimeResult<()> {
        self.state.write().await.calls.push(RuntimeCall {
            operation,
            target: target.to_string(),
        });
        if self.failures.contains(&operation) {
            return Err(RuntimeError::Api {
                operation: format!("{operation:?}"),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> RuntimeError {
    RuntimeError::NotFound(format!("no such container: {id}"))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn container_id(sequence: u64) -> String {
    Sha256::digest(sequence.to_be_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn ensure_image(&self, image: &str) -> RuntimeResult<()> {
        self.record(RuntimeOperation::EnsureImage, image).await?;
        if !self.pull_delay.is_zero() {
            tokio::time::sleep(self.pull_delay).await;
        }
        self.state.write().await.images.insert(image.to_string());
        Ok(())
    }

    async fn create(&self, request: &ContainerRequest) -> RuntimeResult<String> {
        self.record(RuntimeOperation::Create, &request.image).await?;
        let mut state = self.state.write().await;
        if let Some(network) = &request.network {
            if !state.networks.contains(&network.name) {
                return Err(RuntimeError::NotFound(format!(
                    "network {} not found",
                    network.name
                )));
            }
        }

        state.created += 1;
        let id = container_id(state.created);
        let container = MockContainer {
            request: request.clone(),
            hostname: id[..12].to_string(),
            running: false,
            ports: BTreeMap::new(),
            files: BTreeMap::new(),
            logs: Vec::new(),
        };
        state.containers.insert(id.clone(), container);
        Ok(id)
    }

    async fn start(&self, id: &str) -> RuntimeResult<()> {
        self.record(RuntimeOperation::Start, id).await?;
        let mut state = self.state.write().await;
        let mut next_port = state.next_host_port;
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        for port in &container.request.exposed_ports {
            container.ports.entry(*port).or_insert_with(|| {
                let host_port = next_port;
                next_port += 1;
                host_port
            });
        }
        container.running = true;
        container.log("waiting for startup script");
        state.next_host_port = next_port;
        Ok(())
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        self.record(RuntimeOperation::Stop, id).await?;
        let mut state = self.state.write().await;
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        container.running = false;
        Ok(())
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        self.record(RuntimeOperation::Remove, id).await?;
        self.state
            .write()
            .await
            .containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerInspection> {
        self.record(RuntimeOperation::Inspect, id).await?;
        let state = self.state.read().await;
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        Ok(ContainerInspection {
            hostname: container.hostname.clone(),
            running: container.running,
            ports: container.ports.clone(),
        })
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> RuntimeResult<ExecOutput> {
        self.record(RuntimeOperation::Exec, id).await?;
        let state = self.state.read().await;
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        if !container.running {
            return Err(RuntimeError::Api {
                operation: "exec".to_string(),
                message: format!("container {id} is not running"),
            });
        }

        match cmd {
            [program, path] if program == "cat" => Ok(match container.files.get(path) {
                Some(file) => ExecOutput {
                    exit_code: 0,
                    stdout: String::from_utf8_lossy(&file.content).into_owned(),
                    stderr: String::new(),
                },
                None => ExecOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: format!("cat: {path}: No such file or directory"),
                },
            }),
            _ => Ok(ExecOutput::default()),
        }
    }

    async fn copy_to_container(
        &self,
        id: &str,
        content: &[u8],
        path: &str,
        mode: u32,
    ) -> RuntimeResult<()> {
        self.record(RuntimeOperation::CopyToContainer, id).await?;
        let mut state = self.state.write().await;
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        container.files.insert(
            path.to_string(),
            MockFile {
                content: content.to_vec(),
                mode,
            },
        );

        if path == STARTER_SCRIPT_PATH && container.running {
            match self.behavior {
                StartupBehavior::Ready => container.log(READY_LOG_LINE),
                StartupBehavior::NeverReady => {
                    container.log("Formatting /tmp/kafka-kraft/data");
                }
                StartupBehavior::ExitBeforeReady => {
                    container.log("ERROR Exiting Kafka due to fatal exception");
                    container.running = false;
                }
            }
        }
        Ok(())
    }

    async fn logs(&self, id: &str, since: Option<i64>) -> RuntimeResult<String> {
        self.record(RuntimeOperation::Logs, id).await?;
        let mut state = self.state.write().await;
        state.log_windows.push(since);
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        let since = since.unwrap_or(i64::MIN);
        Ok(container
            .logs
            .iter()
            .filter(|(at, _)| *at >= since)
            .map(|(_, line)| line.as_str())
            .collect())
    }

    async fn list(&self, labels: &BTreeMap<String, String>) -> RuntimeResult<Vec<ContainerSummary>> {
        self.record(RuntimeOperation::List, "").await?;
        let state = self.state.read().await;
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| {
                labels
                    .iter()
                    .all(|(k, v)| c.request.labels.get(k) == Some(v))
            })
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                image: c.request.image.clone(),
                labels: c.request.labels.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<String> {
        self.record(RuntimeOperation::CreateNetwork, name).await?;
        let mut state = self.state.write().await;
        if !state.networks.insert(name.to_string()) {
            return Err(RuntimeError::Api {
                operation: "create network".to_string(),
                message: format!("network {name} already exists"),
            });
        }
        Ok(name.to_string())
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.record(RuntimeOperation::RemoveNetwork, name).await?;
        let mut state = self.state.write().await;
        if !state.networks.remove(name) {
            return Err(RuntimeError::NotFound(format!("network {name} not found")));
        }
        Ok(())
    }
}
