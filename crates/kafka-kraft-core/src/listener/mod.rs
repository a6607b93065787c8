//! Broker listener definitions, validation and planning.
//!
//! A KRaft broker in this crate always runs three kinds of listeners:
//!
//! - `CONTROLLER` on [`CONTROLLER_PORT`], used by the embedded controller quorum
//! - `PLAINTEXT` on [`PLAINTEXT_PORT`], published to the host for external clients
//! - `BROKER` on [`BROKER_PORT`] (or the caller's own listeners), reachable from
//!   sibling containers on a private network
//!
//! Callers may declare additional listeners; [`validate_listeners`] rejects
//! anything that collides with the reserved ones and [`ListenerPlan`] merges
//! the result into the full listener map the broker starts with.

mod plan;
mod validate;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use plan::{Advertise, AdvertisedAddress, ListenerPlan, PlanEntry};
pub use validate::{validate_listeners, ValidatedListener};

/// Name of the controller quorum listener.
pub const CONTROLLER_LISTENER: &str = "CONTROLLER";

/// Name of the host-facing plaintext listener.
pub const PLAINTEXT_LISTENER: &str = "PLAINTEXT";

/// Name of the default inter-broker listener.
pub const BROKER_LISTENER: &str = "BROKER";

/// Port of the controller quorum listener inside the container.
pub const CONTROLLER_PORT: u16 = 9094;

/// Port of the host-facing plaintext listener inside the container.
pub const PLAINTEXT_PORT: u16 = 9093;

/// Port of the default inter-broker listener inside the container.
pub const BROKER_PORT: u16 = 9092;

/// Address every listener binds to inside the container.
pub const BIND_ADDRESS: &str = "0.0.0.0";

/// A listener declared by the caller.
///
/// Fields are kept as supplied; [`validate_listeners`] trims and normalizes
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaListener {
    /// Listener name, matched case-insensitively.
    pub name: String,
    /// Host clients should use to reach this listener.
    pub host: String,
    /// Port the broker binds inside the container.
    pub port: String,
}

impl KafkaListener {
    /// Create a listener definition.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: port.into(),
        }
    }
}

/// Security protocol of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    /// Plain TCP without encryption or authentication.
    #[default]
    Plaintext,
    /// TLS encryption without SASL authentication.
    Ssl,
    /// SASL authentication without TLS encryption.
    SaslPlaintext,
    /// TLS encryption with SASL authentication.
    SaslSsl,
}

impl SecurityProtocol {
    /// Protocol name as used in `listener.security.protocol.map`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener names and ports the broker keeps for itself.
///
/// Built once and handed to the validator and the plan builder, so tests can
/// exercise validation against any reserved set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedListeners {
    names: BTreeSet<String>,
    ports: BTreeSet<u16>,
    broker_name: String,
    broker_port: u16,
}

impl ReservedListeners {
    /// Reserved set for the single-node KRaft layout.
    #[must_use]
    pub fn kraft_defaults() -> Self {
        Self::new(
            [CONTROLLER_LISTENER, PLAINTEXT_LISTENER],
            [PLAINTEXT_PORT, CONTROLLER_PORT],
            BROKER_LISTENER,
            BROKER_PORT,
        )
    }

    /// Build a custom reserved set.
    ///
    /// `broker_name`/`broker_port` describe the default inter-broker listener,
    /// which callers may redeclare once.
    pub fn new<N, P>(names: N, ports: P, broker_name: impl Into<String>, broker_port: u16) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        P: IntoIterator<Item = u16>,
    {
        let broker_name: String = broker_name.into();
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_uppercase())
                .collect(),
            ports: ports.into_iter().collect(),
            broker_name: broker_name.trim().to_uppercase(),
            broker_port,
        }
    }

    /// Whether `name` (already normalized) is reserved.
    #[must_use]
    pub fn is_reserved_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether `port` is reserved.
    #[must_use]
    pub fn is_reserved_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    /// Name of the default inter-broker listener.
    #[must_use]
    pub fn broker_name(&self) -> &str {
        &self.broker_name
    }

    /// Port of the default inter-broker listener.
    #[must_use]
    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }
}

impl Default for ReservedListeners {
    fn default() -> Self {
        Self::kraft_defaults()
    }
}
