//! Creating and starting broker containers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterIdentity, NodeRole};
use crate::config::RunOptions;
use crate::error::{ConfigError, KafkaError, ResolutionError, Result};
use crate::image::ImageRef;
use crate::listener::{AdvertisedAddress, ListenerPlan, ReservedListeners};
use crate::runtime::{ContainerRequest, ContainerRuntime};
use crate::script::{
    validate_extra_properties, wait_for_script_command, wait_for_script_entrypoint,
    StartupScript, STARTER_SCRIPT_MODE, STARTER_SCRIPT_PATH,
};

use super::{KafkaContainer, LifecycleState, CLUSTER_ID_LABEL, MANAGED_LABEL};

/// Log lines that mean the broker accepts clients.
pub const READY_LOG_MARKERS: &[&str] = &[
    "Transitioning from RECOVERY to RUNNING",
    "Kafka Server started",
];

/// Delay between readiness checks.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything derived from [`RunOptions`] before touching the runtime.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub image: ImageRef,
    pub identity: ClusterIdentity,
    pub plan: ListenerPlan,
}

/// Validate `options` and derive the image, identity and listener plan.
///
/// Performs no runtime calls.
///
/// # Errors
///
/// Returns [`KafkaError::Config`] for invalid options and
/// [`KafkaError::UnsupportedVersion`] for images without KRaft support.
pub fn prepare(options: &RunOptions, reserved: &ReservedListeners) -> Result<Prepared> {
    options.validate()?;

    let image = ImageRef::parse(&options.image)?;
    image.ensure_kraft_support()?;

    // A lone broker needs its own controller quorum and vice versa.
    if options.node_role != NodeRole::Combined {
        return Err(ConfigError::UnsupportedNodeRole {
            role: options.node_role.to_string(),
        }
        .into());
    }

    validate_extra_properties(&options.broker_properties)?;
    let identity = ClusterIdentity::resolve(options.cluster_id(), options.node_role)?;
    let plan = ListenerPlan::build(&options.listeners, reserved, options.aliases())?;

    Ok(Prepared {
        image,
        identity,
        plan,
    })
}

fn container_request(prepared: &Prepared, options: &RunOptions) -> ContainerRequest {
    let labels = BTreeMap::from([
        (MANAGED_LABEL.to_string(), "true".to_string()),
        (
            CLUSTER_ID_LABEL.to_string(),
            prepared.identity.cluster_id().to_string(),
        ),
    ]);

    ContainerRequest {
        image: prepared.image.to_string(),
        entrypoint: wait_for_script_entrypoint(),
        cmd: wait_for_script_command(),
        env: options.env.clone(),
        labels,
        exposed_ports: vec![prepared.plan.host_port()],
        network: options.network.clone(),
    }
}

fn is_ready(logs: &str) -> bool {
    READY_LOG_MARKERS.iter().any(|marker| logs.contains(marker))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

impl KafkaContainer {
    /// Create and start a broker container, waiting until it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if validation, creation or startup fails. No
    /// container is left behind on error.
    pub async fn run(runtime: Arc<dyn ContainerRuntime>, options: RunOptions) -> Result<Self> {
        Self::run_with_cancellation(runtime, options, CancellationToken::new()).await
    }

    /// Like [`KafkaContainer::run`], aborting the image pull or the readiness
    /// wait when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::PullCancelled`] when cancelled while pulling and
    /// [`KafkaError::Cancelled`] when cancelled after creation, after cleanup.
    pub async fn run_with_cancellation(
        runtime: Arc<dyn ContainerRuntime>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut container = Self::create_with_cancellation(runtime, options, &cancel).await?;
        container.start(cancel).await?;
        Ok(container)
    }

    /// Validate `options` and create the container without starting it.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any runtime call, and runtime errors
    /// from pulling the image or creating the container.
    pub async fn create(runtime: Arc<dyn ContainerRuntime>, options: RunOptions) -> Result<Self> {
        Self::create_with_cancellation(runtime, options, &CancellationToken::new()).await
    }

    /// Like [`KafkaContainer::create`], abandoning the image pull when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::PullCancelled`] if cancelled before the
    /// container is created.
    #[instrument(skip_all, fields(image = %options.image))]
    pub async fn create_with_cancellation(
        runtime: Arc<dyn ContainerRuntime>,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let prepared = prepare(&options, &ReservedListeners::kraft_defaults())?;
        let request = container_request(&prepared, &options);

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(KafkaError::PullCancelled { image: request.image.clone() });
            }
            pulled = runtime.ensure_image(&request.image) => pulled?,
        }
        let id = runtime.create(&request).await?;

        info!(
            container_id = %id,
            cluster_id = %prepared.identity.cluster_id(),
            listeners = %prepared.plan.listeners_value(),
            "created broker container"
        );

        Ok(Self {
            runtime,
            id,
            image: prepared.image,
            identity: prepared.identity,
            plan: prepared.plan,
            options,
            state: LifecycleState::Created,
            hostname: None,
        })
    }

    /// Start a created container and wait for the broker to become ready.
    ///
    /// On failure the container is stopped and removed and the state becomes
    /// [`LifecycleState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::InvalidState`] unless the container is
    /// `Created`; [`KafkaError::StartupTimeout`], [`KafkaError::Cancelled`]
    /// or [`KafkaError::ContainerExited`] if readiness is not reached; and
    /// runtime errors.
    #[instrument(skip_all, fields(container_id = %self.id))]
    pub async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        if self.state != LifecycleState::Created {
            return Err(KafkaError::InvalidState {
                state: self.state.to_string(),
                expected: LifecycleState::Created.to_string(),
            });
        }
        self.state = LifecycleState::Starting;

        match self.start_and_wait(&cancel).await {
            Ok(hostname) => {
                info!(hostname = %hostname, "broker ready");
                self.hostname = Some(hostname);
                self.state = LifecycleState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "broker startup failed, removing container");
                self.cleanup().await;
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn start_and_wait(&self, cancel: &CancellationToken) -> Result<String> {
        let started = Instant::now();
        let deadline = started + self.options.startup_timeout();

        self.runtime.start(&self.id).await?;

        let inspection = self.runtime.inspect(&self.id).await?;
        let host_port = self.plan.host_port();
        let mapped_port = inspection
            .host_port(host_port)
            .ok_or(ResolutionError::PortNotMapped { port: host_port })?;
        let address = AdvertisedAddress {
            host: self.runtime.host(),
            mapped_port,
            hostname: inspection.hostname,
        };

        let script = StartupScript::render(
            &self.plan,
            &self.identity,
            &address,
            &self.options.broker_properties,
        );
        debug!(
            advertised = ?script.properties().get("advertised.listeners"),
            "copying startup script"
        );
        self.runtime
            .copy_to_container(
                &self.id,
                script.content().as_bytes(),
                STARTER_SCRIPT_PATH,
                STARTER_SCRIPT_MODE,
            )
            .await?;

        self.wait_until_ready(started, deadline, cancel).await?;
        Ok(address.hostname)
    }

    async fn wait_until_ready(
        &self,
        started: Instant,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut since = None;
        loop {
            if cancel.is_cancelled() {
                return Err(KafkaError::Cancelled {
                    container_id: self.id.clone(),
                    elapsed: started.elapsed(),
                });
            }
            if Instant::now() >= deadline {
                return Err(KafkaError::StartupTimeout {
                    container_id: self.id.clone(),
                    elapsed: started.elapsed(),
                });
            }

            let fetched_at = unix_now();
            let logs = self.runtime.logs(&self.id, since).await?;
            if is_ready(&logs) {
                return Ok(());
            }
            // Log timestamps have one-second resolution; windows overlap by a
            // second so a line written during a fetch is not skipped.
            since = Some(fetched_at - 1);
            if !self.runtime.inspect(&self.id).await?.running {
                return Err(KafkaError::ContainerExited {
                    container_id: self.id.clone(),
                });
            }

            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
                () = tokio::time::sleep(READINESS_POLL_INTERVAL) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::KafkaListener;

    #[test]
    fn test_prepare_defaults() {
        let prepared = prepare(&RunOptions::default(), &ReservedListeners::kraft_defaults()).unwrap();
        assert_eq!(prepared.image.tag(), "7.5.0");
        assert_eq!(prepared.plan.inter_broker_listener(), "BROKER");
        assert_eq!(prepared.identity.node_role(), NodeRole::Combined);
    }

    #[test]
    fn test_prepare_rejects_single_role() {
        for role in [NodeRole::Broker, NodeRole::Controller] {
            let options = RunOptions::default().with_node_role(role);
            let result = prepare(&options, &ReservedListeners::kraft_defaults());
            assert!(matches!(
                result,
                Err(KafkaError::Config(ConfigError::UnsupportedNodeRole { .. }))
            ));
        }
    }

    #[test]
    fn test_prepare_rejects_old_image_before_listeners() {
        let options = RunOptions::new("confluentinc/confluent-local:6.3.3")
            .with_listeners(vec![KafkaListener::new("PLAINTEXT", "kafka", "9092")]);
        let result = prepare(&options, &ReservedListeners::kraft_defaults());
        assert!(matches!(result, Err(KafkaError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_prepare_rejects_managed_property() {
        let options = RunOptions::default().with_broker_property("node.id", "2");
        let result = prepare(&options, &ReservedListeners::kraft_defaults());
        assert!(matches!(
            result,
            Err(KafkaError::Config(ConfigError::ManagedProperty { .. }))
        ));
    }

    #[test]
    fn test_container_request() {
        let options = RunOptions::default()
            .with_cluster_id("kraftCluster")
            .with_network("kafka-net", ["kafka"])
            .with_env("KAFKA_HEAP_OPTS", "-Xmx256m");
        let prepared = prepare(&options, &ReservedListeners::kraft_defaults()).unwrap();
        let request = container_request(&prepared, &options);

        assert_eq!(request.image, "confluentinc/confluent-local:7.5.0");
        assert_eq!(request.exposed_ports, vec![9093]);
        assert_eq!(request.labels[MANAGED_LABEL], "true");
        assert_eq!(request.labels[CLUSTER_ID_LABEL], "kraftCluster");
        assert_eq!(request.env["KAFKA_HEAP_OPTS"], "-Xmx256m");
        assert_eq!(request.network.as_ref().map(|n| n.name.as_str()), Some("kafka-net"));
        assert_eq!(request.entrypoint, ["sh".to_string()]);
        assert!(request.cmd.last().unwrap().contains(STARTER_SCRIPT_PATH));
    }

    #[test]
    fn test_is_ready() {
        assert!(is_ready(
            "[2024-01-01] INFO [BrokerServer id=1] Transitioning from RECOVERY to RUNNING\n"
        ));
        assert!(is_ready("INFO [KafkaRaftServer nodeId=1] Kafka Server started\n"));
        assert!(!is_ready("Formatting /tmp/kafka-kraft/data\n"));
    }
}
