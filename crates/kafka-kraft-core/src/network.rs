//! Private networks for colocating the broker with sibling containers.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use crate::error::RuntimeResult;
use crate::runtime::ContainerRuntime;

/// A bridge network created through a [`ContainerRuntime`].
///
/// The caller owns the network and must call [`Network::remove`] once every
/// container attached to it is gone.
pub struct Network {
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    id: String,
}

impl Network {
    /// Create a network named `name`.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if creation fails.
    pub async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        name: impl Into<String>,
    ) -> RuntimeResult<Self> {
        let name = name.into();
        let id = runtime.create_network(&name).await?;
        info!(network = %name, "created network");
        Ok(Self { runtime, name, id })
    }

    /// Create a network with a random `kafka-kraft-` prefixed name.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if creation fails.
    pub async fn create_random(runtime: Arc<dyn ContainerRuntime>) -> RuntimeResult<Self> {
        Self::create(runtime, random_network_name()).await
    }

    /// Network name, as used in a network attachment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier returned by the runtime.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the network.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error, e.g. when containers are still attached.
    pub async fn remove(self) -> RuntimeResult<()> {
        if let Err(e) = self.runtime.remove_network(&self.id).await {
            warn!(network = %self.name, error = %e, "failed to remove network");
            return Err(e);
        }
        info!(network = %self.name, "removed network");
        Ok(())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn random_network_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("kafka-kraft-{suffix}")
}
