//! Domain error types for Kafka KRaft container provisioning.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use std::time::Duration;

use thiserror::Error;

/// Errors related to configuration parsing and validation.
///
/// Every variant is raised before any container resource is allocated.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Listener name is empty or contains characters Kafka does not accept.
    #[error("invalid listener name '{name}': {reason}")]
    InvalidListenerName { name: String, reason: String },

    /// Listener host is empty or malformed.
    #[error("invalid host '{host}' for listener {name}")]
    InvalidListenerHost { name: String, host: String },

    /// Listener port is not a valid TCP port.
    #[error("invalid port '{port}' for listener {name} (expected 1-65535)")]
    InvalidListenerPort { name: String, port: String },

    /// Listener name collides with a name the broker reserves for itself.
    #[error("listener name {name} is reserved")]
    ReservedListenerName { name: String },

    /// Listener port collides with a port the broker reserves for itself.
    #[error("listener {name} uses reserved port {port}")]
    ReservedListenerPort { name: String, port: u16 },

    /// Two listeners share a name (case-insensitive).
    #[error("duplicate of listener name: {name}")]
    DuplicateListenerName { name: String },

    /// Two listeners share a port.
    #[error("duplicate of listener port: {port} (listener {name})")]
    DuplicateListenerPort { name: String, port: u16 },

    /// Image reference could not be parsed.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Cluster id is empty or malformed.
    #[error("invalid cluster id '{cluster_id}': {reason}")]
    InvalidClusterId { cluster_id: String, reason: String },

    /// A single-node container cannot run this process role.
    #[error("node role '{role}' cannot run as a single-node cluster (use 'combined')")]
    UnsupportedNodeRole { role: String },

    /// Extra broker property overrides a key derived from the listener plan.
    #[error("broker property '{key}' is managed by the listener plan and cannot be overridden")]
    ManagedProperty { key: String },

    /// Extra broker property is malformed.
    #[error("invalid broker property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    /// Network attachment is malformed.
    #[error("invalid network attachment: {0}")]
    InvalidNetwork(String),

    /// Startup timeout must be positive.
    #[error("startup timeout must be greater than zero")]
    ZeroStartupTimeout,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Errors reported by the container runtime collaborator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A runtime API call failed.
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    /// The referenced container or network does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Failed to build the archive used to copy files into a container.
    #[error("failed to build archive for '{path}': {source}")]
    Archive {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while resolving broker addresses.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// Addresses were requested before the container reached `Ready`.
    #[error("container is {state}, brokers can only be resolved once it is ready")]
    NotReady { state: String },

    /// The runtime reports no host mapping for the client port.
    #[error("container port {port}/tcp has no host mapping")]
    PortNotMapped { port: u16 },

    /// Sibling addressing needs a network alias.
    #[error("container is not attached to a network with aliases")]
    NoNetworkAlias,

    /// Runtime inspection failed.
    #[error("failed to inspect container: {0}")]
    Inspect(#[source] RuntimeError),
}

/// Errors returned by the container lifecycle.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Invalid or conflicting configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Broker image predates KRaft support.
    #[error("image {image} has version {version}; KRaft mode is only available since version {minimum}")]
    UnsupportedVersion {
        image: String,
        version: String,
        minimum: String,
    },

    /// Broker did not report readiness before the deadline.
    #[error("container {container_id} not ready after {elapsed:?}")]
    StartupTimeout {
        container_id: String,
        elapsed: Duration,
    },

    /// Startup was cancelled by the caller.
    #[error("startup of container {container_id} cancelled after {elapsed:?}")]
    Cancelled {
        container_id: String,
        elapsed: Duration,
    },

    /// Image pull was cancelled by the caller; no container was created.
    #[error("pull of image {image} cancelled")]
    PullCancelled { image: String },

    /// Broker process exited before becoming ready.
    #[error("container {container_id} exited before becoming ready")]
    ContainerExited { container_id: String },

    /// Lifecycle operation called in the wrong state.
    #[error("container is in state '{state}', expected '{expected}'")]
    InvalidState { state: String, expected: String },

    /// Address resolution failed.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Container runtime failure.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type alias for container lifecycle operations.
pub type Result<T> = std::result::Result<T, KafkaError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for container runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
