//! Test harness for exercising the bootstrap pipeline without a container engine.
//!
//! Provides:
//! - A shared [`MockRuntime`]
//! - Helpers to run broker containers against it
//! - Leak checks over the containers this crate labels

use std::sync::Arc;
use std::time::Duration;

use crate::config::RunOptions;
use crate::container::{managed_label_filter, KafkaContainer};
use crate::error::Result;
use crate::network::Network;
use crate::runtime::{ContainerRuntime, ContainerSummary};

use super::mock_runtime::{MockRuntime, RuntimeOperation, StartupBehavior};

/// Test harness wrapping a [`MockRuntime`].
pub struct BootstrapHarness {
    /// The mock runtime
    pub runtime: Arc<MockRuntime>,
}

impl BootstrapHarness {
    /// Harness whose brokers become ready immediately.
    pub fn new() -> Self {
        Self::with_runtime(MockRuntime::new())
    }

    /// Harness over a preconfigured runtime.
    pub fn with_runtime(runtime: MockRuntime) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }

    /// The runtime as the trait object the pipeline consumes.
    #[must_use]
    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.runtime.clone()
    }

    /// Run a broker container with `options`.
    pub async fn run(&self, options: RunOptions) -> Result<KafkaContainer> {
        KafkaContainer::run(self.runtime(), options).await
    }

    /// Run a broker container with default options.
    pub async fn run_default(&self) -> Result<KafkaContainer> {
        self.run(RunOptions::default()).await
    }

    /// Create a network on the mock runtime.
    pub async fn network(&self, name: &str) -> crate::error::RuntimeResult<Network> {
        Network::create(self.runtime(), name).await
    }

    /// Containers carrying the managed label that still exist.
    pub async fn managed_containers(&self) -> Vec<ContainerSummary> {
        self.runtime
            .list(&managed_label_filter())
            .await
            .unwrap_or_default()
    }

    /// Whether any runtime call was made.
    pub async fn runtime_touched(&self) -> bool {
        !self.runtime.calls().await.is_empty()
    }
}

impl Default for BootstrapHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a harness with a specific runtime behavior.
pub struct TestHarnessBuilder {
    runtime: MockRuntime,
}

impl TestHarnessBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: MockRuntime::new(),
        }
    }

    /// Make every image pull take `delay`.
    #[must_use]
    pub fn pull_delay(mut self, delay: Duration) -> Self {
        self.runtime = self.runtime.with_pull_delay(delay);
        self
    }

    /// Set how the emulated broker reacts to its startup script.
    #[must_use]
    pub fn startup_behavior(mut self, behavior: StartupBehavior) -> Self {
        self.runtime = self.runtime.with_startup_behavior(behavior);
        self
    }

    /// Make every call of `operation` fail.
    #[must_use]
    pub fn failing(mut self, operation: RuntimeOperation) -> Self {
        self.runtime = self.runtime.failing(operation);
        self
    }

    /// Set the host the runtime publishes ports on.
    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.runtime = self.runtime.with_host(host);
        self
    }

    /// Build the test harness.
    #[must_use]
    pub fn build(self) -> BootstrapHarness {
        BootstrapHarness::with_runtime(self.runtime)
    }
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
