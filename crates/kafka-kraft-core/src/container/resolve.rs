//! Client-facing broker addresses.

use tracing::{debug, instrument};

use crate::error::{ResolutionError, Result};
use crate::runtime::ContainerInspection;

use super::{KafkaContainer, LifecycleState};

/// `host:port` for the host-mapped client port.
fn host_broker(
    host: &str,
    inspection: &ContainerInspection,
    container_port: u16,
) -> std::result::Result<String, ResolutionError> {
    let port = inspection
        .host_port(container_port)
        .ok_or(ResolutionError::PortNotMapped {
            port: container_port,
        })?;
    Ok(format!("{host}:{port}"))
}

impl KafkaContainer {
    /// Bootstrap servers for clients on the host.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotReady`] before the broker is ready,
    /// [`ResolutionError::PortNotMapped`] if the runtime reports no mapping
    /// for the client port, and [`ResolutionError::Inspect`] if inspection
    /// fails.
    #[instrument(skip(self), fields(container_id = %self.id))]
    pub async fn brokers(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let inspection = self
            .runtime
            .inspect(&self.id)
            .await
            .map_err(ResolutionError::Inspect)?;
        let broker = host_broker(&self.runtime.host(), &inspection, self.plan.host_port())?;
        debug!(broker = %broker, "resolved host broker");
        Ok(vec![broker])
    }

    /// Bootstrap servers for containers on the same network, one per alias.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotReady`] before the broker is ready and
    /// [`ResolutionError::NoNetworkAlias`] without network aliases.
    pub fn network_brokers(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let aliases = self.options.aliases();
        if aliases.is_empty() {
            return Err(ResolutionError::NoNetworkAlias.into());
        }
        let port = self.plan.internal_port();
        Ok(aliases
            .iter()
            .map(|alias| format!("{alias}:{port}"))
            .collect())
    }

    fn ensure_ready(&self) -> std::result::Result<(), ResolutionError> {
        if self.state != LifecycleState::Ready {
            return Err(ResolutionError::NotReady {
                state: self.state.to_string(),
            });
        }
        Ok(())
    }
}
