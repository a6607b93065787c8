//! Merging caller listeners with the mandatory KRaft listeners.

use crate::error::ConfigResult;

use super::validate::{validate_listeners, ValidatedListener};
use super::{
    KafkaListener, ReservedListeners, SecurityProtocol, BIND_ADDRESS, CONTROLLER_LISTENER,
    CONTROLLER_PORT, PLAINTEXT_LISTENER, PLAINTEXT_PORT,
};

/// How a listener appears in `advertised.listeners`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advertise {
    /// Not advertised (controller listener).
    Never,
    /// Runtime host plus the host-mapped port.
    HostMapped,
    /// The container's own hostname plus the listener port.
    ContainerHostname,
    /// The host the caller declared plus the listener port.
    Declared(String),
}

/// One listener of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub port: u16,
    pub protocol: SecurityProtocol,
    pub advertise: Advertise,
}

/// Addresses that only exist once the container is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedAddress {
    /// Host through which the runtime publishes container ports.
    pub host: String,
    /// Host port mapped to the plaintext listener.
    pub mapped_port: u16,
    /// Hostname of the container on its networks.
    pub hostname: String,
}

/// The complete listener layout a broker container starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPlan {
    entries: Vec<PlanEntry>,
    inter_broker: String,
}

impl ListenerPlan {
    /// Validate `listeners` and build the plan.
    ///
    /// `aliases` are the container's network aliases; user listeners declared
    /// on one of them advertise the container hostname instead.
    ///
    /// # Errors
    ///
    /// Returns the validator's error unchanged.
    pub fn build(
        listeners: &[KafkaListener],
        reserved: &ReservedListeners,
        aliases: &[String],
    ) -> ConfigResult<Self> {
        let validated = validate_listeners(listeners, reserved)?;
        Ok(Self::from_validated(validated, reserved, aliases))
    }

    /// Build the plan from already validated listeners.
    #[must_use]
    pub fn from_validated(
        listeners: Vec<ValidatedListener>,
        reserved: &ReservedListeners,
        aliases: &[String],
    ) -> Self {
        let mut entries = Vec::with_capacity(listeners.len() + 3);
        entries.push(PlanEntry {
            name: CONTROLLER_LISTENER.to_string(),
            port: CONTROLLER_PORT,
            protocol: SecurityProtocol::Plaintext,
            advertise: Advertise::Never,
        });
        entries.push(PlanEntry {
            name: PLAINTEXT_LISTENER.to_string(),
            port: PLAINTEXT_PORT,
            protocol: SecurityProtocol::Plaintext,
            advertise: Advertise::HostMapped,
        });

        let inter_broker = if listeners.is_empty() {
            entries.push(PlanEntry {
                name: reserved.broker_name().to_string(),
                port: reserved.broker_port(),
                protocol: SecurityProtocol::Plaintext,
                advertise: Advertise::ContainerHostname,
            });
            reserved.broker_name().to_string()
        } else if listeners.iter().any(|l| l.name == reserved.broker_name()) {
            reserved.broker_name().to_string()
        } else {
            listeners[0].name.clone()
        };

        for listener in listeners {
            let on_alias = aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(&listener.host));
            let advertise = if listener.name == reserved.broker_name() || on_alias {
                Advertise::ContainerHostname
            } else {
                Advertise::Declared(listener.host)
            };
            entries.push(PlanEntry {
                name: listener.name,
                port: listener.port,
                protocol: SecurityProtocol::default(),
                advertise,
            });
        }

        Self {
            entries,
            inter_broker,
        }
    }

    /// Plan entries in rendering order.
    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Name of the listener brokers use to talk to each other.
    #[must_use]
    pub fn inter_broker_listener(&self) -> &str {
        &self.inter_broker
    }

    /// Name of the controller quorum listener.
    #[must_use]
    pub fn controller_listener(&self) -> &str {
        CONTROLLER_LISTENER
    }

    /// Port of the controller quorum listener.
    #[must_use]
    pub fn controller_port(&self) -> u16 {
        CONTROLLER_PORT
    }

    /// Container port published to the host.
    #[must_use]
    pub fn host_port(&self) -> u16 {
        PLAINTEXT_PORT
    }

    /// Port sibling containers use.
    ///
    /// This is the port of a listener advertised with the container hostname,
    /// preferring the inter-broker listener. Without one, the inter-broker
    /// listener's port.
    #[must_use]
    pub fn internal_port(&self) -> u16 {
        let inter_broker = self.entries.iter().find(|e| e.name == self.inter_broker);
        inter_broker
            .filter(|e| e.advertise == Advertise::ContainerHostname)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.advertise == Advertise::ContainerHostname)
            })
            .or(inter_broker)
            .map_or(PLAINTEXT_PORT, |e| e.port)
    }

    /// Value of `listeners`.
    #[must_use]
    pub fn listeners_value(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}://{}:{}", e.name, BIND_ADDRESS, e.port))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Value of `listener.security.protocol.map`.
    #[must_use]
    pub fn security_protocol_map(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}:{}", e.name, e.protocol))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Value of `advertised.listeners` for a running container.
    #[must_use]
    pub fn advertised_listeners(&self, address: &AdvertisedAddress) -> String {
        self.entries
            .iter()
            .filter_map(|e| match &e.advertise {
                Advertise::Never => None,
                Advertise::HostMapped => Some(format!(
                    "{}://{}:{}",
                    e.name, address.host, address.mapped_port
                )),
                Advertise::ContainerHostname => {
                    Some(format!("{}://{}:{}", e.name, address.hostname, e.port))
                }
                Advertise::Declared(host) => Some(format!("{}://{}:{}", e.name, host, e.port)),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
