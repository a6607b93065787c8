//! Validation of caller-declared listeners.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};

use super::{KafkaListener, ReservedListeners};

/// A listener that passed validation.
///
/// The name is trimmed and upper-cased, the host trimmed and the port parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedListener {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// Validate caller listeners against the reserved set and each other.
///
/// Checks run per listener in declaration order and the first violation is
/// returned. An empty slice is valid.
///
/// # Errors
///
/// Returns a [`ConfigError`] naming the offending listener when a name or
/// host is malformed, a port does not parse, a name or port is reserved, or
/// a name (case-insensitive) or port repeats.
pub fn validate_listeners(
    listeners: &[KafkaListener],
    reserved: &ReservedListeners,
) -> ConfigResult<Vec<ValidatedListener>> {
    let mut names = HashSet::with_capacity(listeners.len());
    let mut ports = HashSet::with_capacity(listeners.len());
    let mut validated = Vec::with_capacity(listeners.len());

    for listener in listeners {
        let name = normalize_name(&listener.name)?;
        let host = normalize_host(&name, &listener.host)?;
        let port = parse_port(&name, &listener.port)?;

        if reserved.is_reserved_name(&name) {
            return Err(ConfigError::ReservedListenerName { name });
        }
        if reserved.is_reserved_port(port) {
            return Err(ConfigError::ReservedListenerPort { name, port });
        }
        if !names.insert(name.clone()) {
            return Err(ConfigError::DuplicateListenerName { name });
        }
        if !ports.insert(port) {
            return Err(ConfigError::DuplicateListenerPort { name, port });
        }

        validated.push(ValidatedListener { name, host, port });
    }

    Ok(validated)
}

fn normalize_name(raw: &str) -> ConfigResult<String> {
    let name = raw.trim().to_uppercase();
    if name.is_empty() {
        return Err(ConfigError::InvalidListenerName {
            name: raw.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ConfigError::InvalidListenerName {
            name: raw.to_string(),
            reason: "only letters, digits and '_' are allowed".to_string(),
        });
    }
    Ok(name)
}

fn normalize_host(name: &str, raw: &str) -> ConfigResult<String> {
    let host = raw.trim();
    if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == ',' || c == '/') {
        return Err(ConfigError::InvalidListenerHost {
            name: name.to_string(),
            host: raw.to_string(),
        });
    }
    Ok(host.to_string())
}

fn parse_port(name: &str, raw: &str) -> ConfigResult<u16> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidListenerPort {
            name: name.to_string(),
            port: raw.to_string(),
        }),
    }
}
