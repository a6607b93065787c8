//! Kafka KRaft Container Core Library
//!
//! This library provisions a single-node Kafka broker running in KRaft mode
//! inside a container. It validates caller listener definitions, merges them
//! with the broker's own listeners, renders the broker startup script, drives
//! the container through startup and resolves the addresses clients use.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Run options and YAML configuration loading
//! - [`error`] - Domain-specific error types
//! - [`listener`] - Listener validation and the KRaft listener plan
//! - [`cluster`] - Cluster id and node role
//! - [`image`] - Image references and the KRaft version gate
//! - [`script`] - Startup script rendering
//! - [`runtime`] - Container runtime seam and its Docker implementation
//! - [`container`] - Container lifecycle and broker address resolution
//! - [`network`] - Private networks for sibling containers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use kafka_kraft_core::{DockerRuntime, KafkaContainer, RunOptions};
//!
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let options = RunOptions::new("confluentinc/confluent-local:7.5.0")
//!     .with_cluster_id("kraftCluster");
//! let kafka = KafkaContainer::run(runtime, options).await?;
//! let brokers = kafka.brokers().await?;
//! kafka.terminate().await?;
//! ```

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod container;
pub mod error;
pub mod image;
pub mod listener;
pub mod network;
pub mod runtime;
pub mod script;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use cluster::{ClusterIdentity, NodeRole};
pub use config::{KafkaContainerConfig, LoggingConfig, NetworkAttachment, RunOptions};
pub use container::{KafkaContainer, LifecycleState};
pub use error::{ConfigError, KafkaError, ResolutionError, Result, RuntimeError};
pub use image::ImageRef;
pub use listener::{KafkaListener, ListenerPlan, ReservedListeners, SecurityProtocol};
pub use network::Network;
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use script::StartupScript;
