//! [`ContainerRuntime`] over the Docker Engine API.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, NetworkingConfig, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};

use super::{ContainerInspection, ContainerRequest, ContainerRuntime, ContainerSummary, ExecOutput};

/// Seconds Docker waits for a graceful stop before killing the container.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker Engine backed runtime.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    host: String,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Api`] if the client cannot be configured.
    pub fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| api_error("connect", e))?;
        Ok(Self::from_client(docker))
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(docker: Docker) -> Self {
        let host = host_from_docker_host(std::env::var("DOCKER_HOST").ok().as_deref());
        Self { docker, host }
    }
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Host published ports are reachable on, derived from `DOCKER_HOST`.
fn host_from_docker_host(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|h| h.strip_prefix("tcp://"))
        .map(|rest| rest.split([':', '/']).next().unwrap_or_default())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

fn api_error(operation: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        other => RuntimeError::Api {
            operation: operation.to_string(),
            message: other.to_string(),
        },
    }
}

/// Build a single-file tar archive rooted at `/`.
fn file_archive(path: &str, content: &[u8], mode: u32) -> RuntimeResult<Vec<u8>> {
    let archive_err = |source| RuntimeError::Archive {
        path: path.to_string(),
        source,
    };

    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, path.trim_start_matches('/'), content)
        .map_err(archive_err)?;
    builder.into_inner().map_err(archive_err)
}

/// Parse Docker's `"9093/tcp" -> [{HostPort: "49154"}]` port map.
fn tcp_port_map(ports: HashMap<String, Option<Vec<PortBinding>>>) -> BTreeMap<u16, u16> {
    ports
        .into_iter()
        .filter_map(|(key, bindings)| {
            let (port, proto) = key.split_once('/')?;
            if proto != "tcp" {
                return None;
            }
            let container_port = port.parse().ok()?;
            let host_port = bindings?
                .into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse().ok()))?;
            Some((container_port, host_port))
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn ensure_image(&self, image: &str) -> RuntimeResult<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "image present locally");
            return Ok(());
        }

        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| api_error("pull image", e))?;
        Ok(())
    }

    async fn create(&self, request: &ContainerRequest) -> RuntimeResult<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = request
            .exposed_ports
            .iter()
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let networking_config = request.network.as_ref().map(|network| NetworkingConfig {
            endpoints_config: HashMap::from([(
                network.name.clone(),
                EndpointSettings {
                    aliases: Some(network.aliases.clone()),
                    ..Default::default()
                },
            )]),
        });

        let config = Config {
            image: Some(request.image.clone()),
            entrypoint: (!request.entrypoint.is_empty()).then(|| request.entrypoint.clone()),
            cmd: Some(request.cmd.clone()),
            env: Some(request.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            labels: Some(request.labels.clone().into_iter().collect()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                publish_all_ports: Some(true),
                network_mode: request.network.as_ref().map(|n| n.name.clone()),
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| api_error("create container", e))?;
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| api_error("start container", e))
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        match self.docker.stop_container(id, Some(options)).await {
            // 304: already stopped
            Ok(())
            | Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(api_error("stop container", e)),
        }
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| api_error("remove container", e))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerInspection> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| api_error("inspect container", e))?;

        let hostname = response
            .config
            .and_then(|c| c.hostname)
            .unwrap_or_default();
        let running = response
            .state
            .and_then(|s| s.running)
            .unwrap_or(false);
        let ports = response
            .network_settings
            .and_then(|n| n.ports)
            .map(tcp_port_map)
            .unwrap_or_default();

        Ok(ContainerInspection {
            hostname,
            running,
            ports,
        })
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> RuntimeResult<ExecOutput> {
        let options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| api_error("create exec", e))?;

        let mut output = ExecOutput::default();
        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| api_error("start exec", e))?;
        if let StartExecResults::Attached { output: mut stream, .. } = started {
            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| api_error("read exec output", e))? {
                    LogOutput::StdOut { message } => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| api_error("inspect exec", e))?;
        output.exit_code = inspected.exit_code.unwrap_or(-1);
        Ok(output)
    }

    async fn copy_to_container(
        &self,
        id: &str,
        content: &[u8],
        path: &str,
        mode: u32,
    ) -> RuntimeResult<()> {
        let archive = file_archive(path, content, mode)?;
        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), Bytes::from(archive))
            .await
            .map_err(|e| api_error("copy to container", e))
    }

    async fn logs(&self, id: &str, since: Option<i64>) -> RuntimeResult<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            since: since.unwrap_or_default(),
            ..Default::default()
        };
        self.docker
            .logs(id, Some(options))
            .try_fold(String::new(), |mut logs, chunk| async move {
                logs.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
                Ok(logs)
            })
            .await
            .map_err(|e| api_error("read logs", e))
    }

    async fn list(&self, labels: &BTreeMap<String, String>) -> RuntimeResult<Vec<ContainerSummary>> {
        let label_filters: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("label".to_string(), label_filters)]),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| api_error("list containers", e))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                labels: c.labels.unwrap_or_default().into_iter().collect(),
                running: c.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<String> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            check_duplicate: true,
            ..Default::default()
        };
        self.docker
            .create_network(options)
            .await
            .map_err(|e| api_error("create network", e))?;
        // Docker accepts the name wherever a network id is expected.
        Ok(name.to_string())
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| api_error("remove network", e))
    }
}
