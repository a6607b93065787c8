//! Broker container handle and lifecycle.
//!
//! A [`KafkaContainer`] moves through `Created -> Starting -> Ready`, or ends
//! in `Failed` if startup does not complete. A failed container has already
//! been stopped and removed; `Failed` is terminal.

mod bootstrap;
mod resolve;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::ClusterIdentity;
use crate::config::RunOptions;
use crate::error::{KafkaError, Result, RuntimeError};
use crate::image::ImageRef;
use crate::listener::ListenerPlan;
use crate::runtime::{ContainerInspection, ContainerRuntime, ExecOutput};
use crate::script::STARTER_SCRIPT_PATH;

pub use bootstrap::{prepare, Prepared, READINESS_POLL_INTERVAL, READY_LOG_MARKERS};

/// Label set on every container this crate creates.
pub const MANAGED_LABEL: &str = "kafka-kraft.managed";

/// Label carrying the cluster id.
pub const CLUSTER_ID_LABEL: &str = "kafka-kraft.cluster-id";

/// Label filter matching every container this crate created.
#[must_use]
pub fn managed_label_filter() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())])
}

/// Lifecycle state of a broker container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created but not started.
    Created,
    /// Started, waiting for the broker to report readiness.
    Starting,
    /// Broker is accepting clients.
    Ready,
    /// Startup failed and the container was removed.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single-node KRaft broker running in a container.
///
/// Dropping the handle does not remove the container; call
/// [`KafkaContainer::terminate`].
pub struct KafkaContainer {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    image: ImageRef,
    identity: ClusterIdentity,
    plan: ListenerPlan,
    options: RunOptions,
    state: LifecycleState,
    hostname: Option<String>,
}

impl KafkaContainer {
    /// Container id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Broker image.
    #[must_use]
    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// Cluster id, exactly as supplied or generated.
    #[must_use]
    pub fn cluster_id(&self) -> &str {
        self.identity.cluster_id()
    }

    /// Cluster identity.
    #[must_use]
    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    /// Listener plan the broker was configured with.
    #[must_use]
    pub fn plan(&self) -> &ListenerPlan {
        &self.plan
    }

    /// Options the container was created with.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Container hostname, known once the container has started.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Inspect the container.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::InvalidState`] after a failed startup and the
    /// runtime's error otherwise.
    pub async fn inspect(&self) -> Result<ContainerInspection> {
        self.ensure_not_failed()?;
        Ok(self.runtime.inspect(&self.id).await?)
    }

    /// Run a command inside the container.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::InvalidState`] after a failed startup and the
    /// runtime's error otherwise.
    pub async fn exec<I, S>(&self, cmd: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_not_failed()?;
        let cmd: Vec<String> = cmd.into_iter().map(Into::into).collect();
        Ok(self.runtime.exec(&self.id, &cmd).await?)
    }

    /// Read the startup script back from the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be read.
    pub async fn startup_script(&self) -> Result<String> {
        let output = self.exec(["cat", STARTER_SCRIPT_PATH]).await?;
        if !output.success() {
            return Err(RuntimeError::Api {
                operation: "read startup script".to_string(),
                message: output.stderr,
            }
            .into());
        }
        Ok(output.stdout)
    }

    /// Stop and remove the container.
    ///
    /// A container whose startup failed was already removed; terminating it
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if stopping or removing fails.
    pub async fn terminate(self) -> Result<()> {
        if self.state == LifecycleState::Failed {
            return Ok(());
        }
        self.runtime.stop(&self.id).await?;
        self.runtime.remove(&self.id).await?;
        info!(container_id = %self.id, "terminated broker container");
        Ok(())
    }

    /// Best-effort stop and remove, used when startup fails.
    async fn cleanup(&self) {
        if let Err(e) = self.runtime.stop(&self.id).await {
            warn!(container_id = %self.id, error = %e, "failed to stop container");
        }
        if let Err(e) = self.runtime.remove(&self.id).await {
            warn!(container_id = %self.id, error = %e, "failed to remove container");
        }
    }

    fn ensure_not_failed(&self) -> Result<()> {
        if self.state == LifecycleState::Failed {
            return Err(KafkaError::InvalidState {
                state: self.state.to_string(),
                expected: "created, starting or ready".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for KafkaContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaContainer")
            .field("id", &self.id)
            .field("image", &self.image.to_string())
            .field("cluster_id", &self.identity.cluster_id())
            .field("state", &self.state)
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}
