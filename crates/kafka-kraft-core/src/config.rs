//! Configuration types for Kafka KRaft containers.
//!
//! Options can be built in code with the `with_*` methods on [`RunOptions`] or
//! loaded from YAML files. Unknown keys are rejected when loading.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cluster::NodeRole;
use crate::error::{ConfigError, ConfigResult};
use crate::image::{ImageRef, DEFAULT_IMAGE};
use crate::listener::KafkaListener;

/// Root of a configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaContainerConfig {
    /// Container options.
    #[serde(default)]
    pub container: RunOptions,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Options for starting a broker container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunOptions {
    /// Broker image reference.
    #[serde(default = "default_image")]
    pub image: String,

    /// Cluster id; generated when not set.
    ///
    /// In configuration files, supports environment variable expansion:
    /// "${CLUSTER_ID}"
    #[serde(default)]
    pub cluster_id: Option<String>,

    /// Process roles of the node.
    #[serde(default)]
    pub node_role: NodeRole,

    /// Additional listeners, in the order they are rendered.
    #[serde(default)]
    pub listeners: Vec<KafkaListener>,

    /// Private network to attach the container to.
    #[serde(default)]
    pub network: Option<NetworkAttachment>,

    /// How long to wait for the broker to become ready, in seconds.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Extra broker properties appended after the generated ones.
    #[serde(default)]
    pub broker_properties: BTreeMap<String, String>,

    /// Extra container environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Attachment of the broker container to a private network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkAttachment {
    /// Network name.
    pub name: String,

    /// DNS aliases of the container on that network.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NetworkAttachment {
    /// Attach to `name` under `aliases`.
    pub fn new<I, S>(name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

// Default value functions

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            image: default_image(),
            cluster_id: None,
            node_role: NodeRole::default(),
            listeners: Vec::new(),
            network: None,
            startup_timeout_secs: default_startup_timeout_secs(),
            broker_properties: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl RunOptions {
    /// Options for `image` with every other field at its default.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Set the cluster id.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    /// Set the node role.
    #[must_use]
    pub fn with_node_role(mut self, role: NodeRole) -> Self {
        self.node_role = role;
        self
    }

    /// Replace the listener list.
    #[must_use]
    pub fn with_listeners(mut self, listeners: Vec<KafkaListener>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Attach the container to `network` under `aliases`.
    #[must_use]
    pub fn with_network<I, S>(mut self, network: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network = Some(NetworkAttachment::new(network, aliases));
        self
    }

    /// Set the startup timeout. Sub-second precision is rounded up.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.startup_timeout_secs = secs;
        self
    }

    /// Add an extra broker property.
    #[must_use]
    pub fn with_broker_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.broker_properties.insert(key.into(), value.into());
        self
    }

    /// Add an extra container environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Startup timeout as a duration.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Cluster id, if one was supplied.
    #[must_use]
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    /// Network aliases, empty without a network attachment.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        self.network
            .as_ref()
            .map(|n| n.aliases.as_slice())
            .unwrap_or(&[])
    }

    /// Validate everything that does not depend on the listener set.
    ///
    /// Listener validation happens when the listener plan is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the image reference is malformed, the timeout is
    /// zero, the network attachment is malformed, or an environment variable
    /// name is empty or contains `=`.
    pub fn validate(&self) -> ConfigResult<()> {
        ImageRef::parse(&self.image)?;

        if self.startup_timeout_secs == 0 {
            return Err(ConfigError::ZeroStartupTimeout);
        }

        if let Some(network) = &self.network {
            if network.name.trim().is_empty() {
                return Err(ConfigError::InvalidNetwork("network name is empty".to_string()));
            }
            if let Some(alias) = network
                .aliases
                .iter()
                .find(|a| a.is_empty() || a.contains(|c: char| c.is_whitespace()))
            {
                return Err(ConfigError::InvalidNetwork(format!(
                    "invalid alias '{alias}'"
                )));
            }
        }

        if let Some(key) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('='))
        {
            return Err(ConfigError::InvalidProperty {
                key: key.clone(),
                reason: "environment variable names must be non-empty and contain no '='"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable `VAR_NAME`.
/// If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

// Configuration loading and validation

impl KafkaContainerConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// `${VAR}` references in the cluster id are expanded from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let mut config: Self = serde_yaml::from_str(content)?;
        if let Some(cluster_id) = &mut config.container.cluster_id {
            *cluster_id = expand_env_vars(cluster_id);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    pub fn validate(&self) -> ConfigResult<()> {
        self.container.validate()
    }
}
