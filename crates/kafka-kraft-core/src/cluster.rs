//! Cluster identity of a broker container.
//!
//! Kafka identifies a cluster by a 16-byte UUID encoded as unpadded URL-safe
//! base64 (22 characters). Callers may pass any label as the cluster id; the
//! label is kept verbatim, and storage is formatted with the label itself when
//! it is a valid Kafka UUID or with a UUID derived from it otherwise.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, ConfigResult};

/// Length of an encoded Kafka UUID.
const KAFKA_UUID_LEN: usize = 22;

/// Process roles of a KRaft node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Broker only.
    Broker,
    /// Controller only.
    Controller,
    /// Broker and controller in one process.
    #[default]
    Combined,
}

impl NodeRole {
    /// Value of `process.roles`.
    #[must_use]
    pub fn process_roles(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Controller => "controller",
            Self::Combined => "broker,controller",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => write!(f, "broker"),
            Self::Controller => write!(f, "controller"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// Cluster id plus the role this node plays in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    cluster_id: String,
    node_role: NodeRole,
}

impl ClusterIdentity {
    /// Identity with a caller-supplied cluster id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidClusterId`] if the id is empty or
    /// contains whitespace or control characters.
    pub fn new(cluster_id: impl Into<String>, node_role: NodeRole) -> ConfigResult<Self> {
        let cluster_id = cluster_id.into();
        validate_cluster_id(&cluster_id)?;
        Ok(Self {
            cluster_id,
            node_role,
        })
    }

    /// Identity with a freshly generated cluster id.
    #[must_use]
    pub fn generate(node_role: NodeRole) -> Self {
        Self {
            cluster_id: generate_cluster_id(),
            node_role,
        }
    }

    /// Use `cluster_id` when supplied, otherwise generate one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidClusterId`] for a malformed supplied id.
    pub fn resolve(cluster_id: Option<&str>, node_role: NodeRole) -> ConfigResult<Self> {
        match cluster_id {
            Some(id) => Self::new(id, node_role),
            None => Ok(Self::generate(node_role)),
        }
    }

    /// The cluster id exactly as supplied or generated.
    #[must_use]
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Role of this node.
    #[must_use]
    pub fn node_role(&self) -> NodeRole {
        self.node_role
    }

    /// UUID used to format the broker's storage directory.
    #[must_use]
    pub fn storage_id(&self) -> String {
        if is_kafka_uuid(&self.cluster_id) {
            return self.cluster_id.clone();
        }
        let digest = Sha256::digest(self.cluster_id.as_bytes());
        URL_SAFE_NO_PAD.encode(&digest[..16])
    }
}

/// Generate a random Kafka cluster id.
#[must_use]
pub fn generate_cluster_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether `id` decodes to the 16 bytes of a Kafka UUID.
#[must_use]
pub fn is_kafka_uuid(id: &str) -> bool {
    id.len() == KAFKA_UUID_LEN
        && URL_SAFE_NO_PAD
            .decode(id)
            .map(|bytes| bytes.len() == 16)
            .unwrap_or(false)
}

fn validate_cluster_id(id: &str) -> ConfigResult<()> {
    if id.is_empty() {
        return Err(ConfigError::InvalidClusterId {
            cluster_id: id.to_string(),
            reason: "cluster id is empty".to_string(),
        });
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigError::InvalidClusterId {
            cluster_id: id.to_string(),
            reason: "whitespace and control characters are not allowed".to_string(),
        });
    }
    Ok(())
}
