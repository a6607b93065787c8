//! Rendering of the broker startup script.
//!
//! The container starts with a command that waits for [`STARTER_SCRIPT_PATH`]
//! to appear and then runs it. The script is rendered once the container is
//! running, because the advertised listeners need the container hostname and
//! the host-mapped port. It writes the broker properties, formats the KRaft
//! storage directory and replaces itself with the broker process.
//!
//! Rendering is pure and deterministic: the same plan, identity, address and
//! extra properties always produce the same bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cluster::ClusterIdentity;
use crate::error::{ConfigError, ConfigResult};
use crate::listener::{AdvertisedAddress, ListenerPlan};

/// Path of the startup script inside the container.
pub const STARTER_SCRIPT_PATH: &str = "/usr/sbin/kafka_kraft_start.sh";

/// File mode of the startup script.
pub const STARTER_SCRIPT_MODE: u32 = 0o755;

/// Path the script writes the broker properties to.
pub const PROPERTIES_PATH: &str = "/tmp/kafka-kraft/server.properties";

/// Broker data directory.
pub const LOG_DIRS: &str = "/tmp/kafka-kraft/data";

/// Node id of the single broker.
pub const NODE_ID: u32 = 1;

/// Keys derived from the listener plan and identity; callers cannot override them.
pub const MANAGED_PROPERTIES: &[&str] = &[
    "process.roles",
    "node.id",
    "cluster.id",
    "controller.quorum.voters",
    "controller.listener.names",
    "listeners",
    "advertised.listeners",
    "listener.security.protocol.map",
    "inter.broker.listener.name",
    "log.dirs",
];

/// Entrypoint of the broker container.
#[must_use]
pub fn wait_for_script_entrypoint() -> Vec<String> {
    vec!["sh".to_string()]
}

/// Arguments to [`wait_for_script_entrypoint`]: wait for the startup script,
/// then run it.
#[must_use]
pub fn wait_for_script_command() -> Vec<String> {
    vec![
        "-c".to_string(),
        format!(
            "while [ ! -f {STARTER_SCRIPT_PATH} ]; do sleep 0.1; done; bash {STARTER_SCRIPT_PATH}"
        ),
    ]
}

/// Check caller-supplied broker properties.
///
/// # Errors
///
/// Returns [`ConfigError::ManagedProperty`] for keys derived from the plan and
/// [`ConfigError::InvalidProperty`] for empty keys, keys containing `=` or
/// whitespace, and keys or values containing line breaks.
pub fn validate_extra_properties(properties: &BTreeMap<String, String>) -> ConfigResult<()> {
    for (key, value) in properties {
        let key_trimmed = key.trim();
        if MANAGED_PROPERTIES.contains(&key_trimmed) {
            return Err(ConfigError::ManagedProperty { key: key.clone() });
        }
        if key_trimmed.is_empty()
            || key.contains('=')
            || key.contains(|c: char| c.is_whitespace())
        {
            return Err(ConfigError::InvalidProperty {
                key: key.clone(),
                reason: "keys must be non-empty and contain no '=' or whitespace".to_string(),
            });
        }
        if value.contains(['\n', '\r']) {
            return Err(ConfigError::InvalidProperty {
                key: key.clone(),
                reason: "values cannot contain line breaks".to_string(),
            });
        }
    }
    Ok(())
}

/// Ordered `key=value` broker properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BrokerProperties {
    entries: Vec<(String, String)>,
}

impl BrokerProperties {
    /// Build the properties for a plan, identity and running container.
    #[must_use]
    pub fn build(
        plan: &ListenerPlan,
        identity: &ClusterIdentity,
        address: &AdvertisedAddress,
        extra: &BTreeMap<String, String>,
    ) -> Self {
        let mut props = Self::default();
        props.push("process.roles", identity.node_role().process_roles());
        props.push("node.id", NODE_ID.to_string());
        props.push("cluster.id", identity.cluster_id());
        props.push(
            "controller.quorum.voters",
            format!("{NODE_ID}@localhost:{}", plan.controller_port()),
        );
        props.push("controller.listener.names", plan.controller_listener());
        props.push("listeners", plan.listeners_value());
        props.push("advertised.listeners", plan.advertised_listeners(address));
        props.push("listener.security.protocol.map", plan.security_protocol_map());
        props.push("inter.broker.listener.name", plan.inter_broker_listener());
        props.push("log.dirs", LOG_DIRS);
        props.push("offsets.topic.replication.factor", "1");
        props.push("offsets.topic.num.partitions", "1");
        props.push("transaction.state.log.replication.factor", "1");
        props.push("transaction.state.log.min.isr", "1");
        props.push("group.initial.rebalance.delay.ms", "0");
        props.push("log.flush.interval.messages", i64::MAX.to_string());
        for (key, value) in extra {
            props.push(key.trim(), value.as_str());
        }
        props
    }

    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Properties in rendering order.
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Render as a Java properties file.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{key}={value}");
        }
        out
    }
}

/// The rendered startup script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupScript {
    properties: BrokerProperties,
    content: String,
}

impl StartupScript {
    /// Render the startup script.
    #[must_use]
    pub fn render(
        plan: &ListenerPlan,
        identity: &ClusterIdentity,
        address: &AdvertisedAddress,
        extra: &BTreeMap<String, String>,
    ) -> Self {
        let properties = BrokerProperties::build(plan, identity, address, extra);
        let storage_id = identity.storage_id();

        let mut content = String::new();
        content.push_str("#!/bin/bash\n");
        content.push_str("set -e\n");
        let _ = writeln!(content, "mkdir -p {LOG_DIRS}");
        let _ = writeln!(content, "cat > {PROPERTIES_PATH} <<'KRAFT_PROPERTIES'");
        content.push_str(&properties.render());
        content.push_str("KRAFT_PROPERTIES\n");
        let _ = writeln!(content, "echo 'Starting Kafka in KRaft mode'");
        let _ = writeln!(
            content,
            "kafka-storage format --ignore-formatted -t {storage_id} -c {PROPERTIES_PATH}"
        );
        let _ = writeln!(content, "exec kafka-server-start {PROPERTIES_PATH}");

        Self {
            properties,
            content,
        }
    }

    /// Broker properties embedded in the script.
    #[must_use]
    pub fn properties(&self) -> &BrokerProperties {
        &self.properties
    }

    /// Script text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Script bytes, as copied into the container.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.content.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRole;
    use crate::listener::{KafkaListener, ReservedListeners};

    fn address() -> AdvertisedAddress {
        AdvertisedAddress {
            host: "localhost".to_string(),
            mapped_port: 49154,
            hostname: "c0ffee123456".to_string(),
        }
    }

    fn plan(listeners: &[KafkaListener], aliases: &[&str]) -> ListenerPlan {
        let aliases: Vec<String> = aliases.iter().map(|a| (*a).to_string()).collect();
        ListenerPlan::build(listeners, &ReservedListeners::kraft_defaults(), &aliases).unwrap()
    }

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("kraftCluster", NodeRole::Combined).unwrap()
    }

    #[test]
    fn test_script_contains_broker_properties() {
        let script = StartupScript::render(&plan(&[], &[]), &identity(), &address(), &BTreeMap::new());
        let content = script.content();

        assert!(content.starts_with("#!/bin/bash\n"));
        assert!(content.contains("process.roles=broker,controller\n"));
        assert!(content.contains("cluster.id=kraftCluster\n"));
        assert!(content.contains("controller.quorum.voters=1@localhost:9094\n"));
        assert!(content.contains(
            "listeners=CONTROLLER://0.0.0.0:9094,PLAINTEXT://0.0.0.0:9093,BROKER://0.0.0.0:9092\n"
        ));
        assert!(content.contains(
            "advertised.listeners=PLAINTEXT://localhost:49154,BROKER://c0ffee123456:9092\n"
        ));
        assert!(content.contains(
            "listener.security.protocol.map=CONTROLLER:PLAINTEXT,PLAINTEXT:PLAINTEXT,BROKER:PLAINTEXT\n"
        ));
        assert!(content.contains("inter.broker.listener.name=BROKER\n"));
        assert!(content.contains("exec kafka-server-start /tmp/kafka-kraft/server.properties\n"));
    }

    #[test]
    fn test_broker_listener_on_alias_uses_hostname() {
        let script = StartupScript::render(
            &plan(&[KafkaListener::new("BROKER", "kafka", "9092")], &["kafka"]),
            &identity(),
            &address(),
            &BTreeMap::new(),
        );
        assert!(script.content().contains("BROKER://c0ffee123456:9092"));
    }

    #[test]
    fn test_storage_formatted_with_storage_id() {
        let identity = identity();
        let script = StartupScript::render(&plan(&[], &[]), &identity, &address(), &BTreeMap::new());
        let expected = format!(
            "kafka-storage format --ignore-formatted -t {} -c /tmp/kafka-kraft/server.properties",
            identity.storage_id()
        );
        assert!(script.content().contains(&expected));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let plan = plan(&[KafkaListener::new("external", "example.com", "19092")], &[]);
        let extra = BTreeMap::from([("auto.create.topics.enable".to_string(), "true".to_string())]);
        let first = StartupScript::render(&plan, &identity(), &address(), &extra);
        let second = StartupScript::render(&plan, &identity(), &address(), &extra);
        assert_eq!(first.into_bytes(), second.into_bytes());
    }

    #[test]
    fn test_extra_properties_appended_in_key_order() {
        let extra = BTreeMap::from([
            ("num.partitions".to_string(), "3".to_string()),
            ("auto.create.topics.enable".to_string(), "true".to_string()),
        ]);
        let script = StartupScript::render(&plan(&[], &[]), &identity(), &address(), &extra);
        let entries = script.properties().entries();
        let tail: Vec<&str> = entries[entries.len() - 2..]
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(tail, ["auto.create.topics.enable", "num.partitions"]);
        assert_eq!(script.properties().get("num.partitions"), Some("3"));
    }

    #[test]
    fn test_managed_properties_cannot_be_overridden() {
        let extra = BTreeMap::from([("advertised.listeners".to_string(), "x".to_string())]);
        assert!(matches!(
            validate_extra_properties(&extra),
            Err(ConfigError::ManagedProperty { .. })
        ));
    }

    #[test]
    fn test_malformed_properties_rejected() {
        for (key, value) in [("", "v"), ("a=b", "v"), ("a b", "v"), ("ok.key", "line\nbreak")] {
            let extra = BTreeMap::from([(key.to_string(), value.to_string())]);
            assert!(
                matches!(
                    validate_extra_properties(&extra),
                    Err(ConfigError::InvalidProperty { .. })
                ),
                "{key:?}={value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_wait_command_runs_script() {
        assert_eq!(wait_for_script_entrypoint(), ["sh".to_string()]);
        let cmd = wait_for_script_command();
        assert_eq!(cmd[0], "-c");
        assert!(cmd[1].contains(STARTER_SCRIPT_PATH));
        assert!(cmd[1].ends_with("bash /usr/sbin/kafka_kraft_start.sh"));
    }
}
