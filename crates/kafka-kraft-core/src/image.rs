//! Broker image references and the KRaft version gate.

use std::cmp::Ordering;
use std::fmt;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult, KafkaError};

/// Repository of the Confluent local image, the only one the gate applies to.
pub const CONFLUENT_LOCAL_REPOSITORY: &str = "confluentinc/confluent-local";

/// First Confluent Platform release whose local image supports KRaft.
pub const MIN_KRAFT_VERSION: Version = Version::new(7, 4, 0);

/// Default broker image.
pub const DEFAULT_IMAGE: &str = "confluentinc/confluent-local:7.5.0";

/// A parsed `repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    repository: String,
    tag: String,
    digest: Option<String>,
}

impl ImageRef {
    /// Parse an image reference. A missing tag means `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidImageReference`] for empty references,
    /// whitespace, or empty repository/tag parts.
    pub fn parse(reference: &str) -> ConfigResult<Self> {
        let invalid = |reason: &str| ConfigError::InvalidImageReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("image cannot be empty"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid("whitespace is not allowed"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(invalid("digest is empty")),
            None => (reference, None),
        };

        // A ':' before the last '/' belongs to a registry host:port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], &name[split + 1..])
            }
            None => (name, "latest"),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid("repository is empty"));
        }
        if tag.is_empty() {
            return Err(invalid("tag is empty"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }

    /// Repository including any registry prefix.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Image tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether this is the Confluent local image, with or without a registry.
    #[must_use]
    pub fn is_confluent_local(&self) -> bool {
        let repo = self.repository.to_ascii_lowercase();
        repo == CONFLUENT_LOCAL_REPOSITORY
            || repo.ends_with(&format!("/{CONFLUENT_LOCAL_REPOSITORY}"))
    }

    /// Reject images that cannot run in KRaft mode.
    ///
    /// Only the Confluent local image is gated; other images are allowed to
    /// start and fail on their own. Non-numeric tags such as `latest` pass.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::UnsupportedVersion`] when the tag is a version
    /// below [`MIN_KRAFT_VERSION`].
    pub fn ensure_kraft_support(&self) -> Result<(), KafkaError> {
        if !self.is_confluent_local() {
            return Ok(());
        }
        let Some(version) = Version::parse_tag(&self.tag) else {
            debug!(image = %self, "tag is not a version, skipping KRaft version check");
            return Ok(());
        };
        if version < MIN_KRAFT_VERSION {
            return Err(KafkaError::UnsupportedVersion {
                image: self.repository.clone(),
                version: self.tag.clone(),
                minimum: MIN_KRAFT_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse an image tag such as `7.5.0`, `v7.6.1` or `7.4.0-1-ubi8`.
    ///
    /// Missing minor/patch components count as zero.
    #[must_use]
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let tag = tag.strip_prefix('v').unwrap_or(tag);
        let core = tag.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_and_tag() {
        let image = ImageRef::parse("confluentinc/confluent-local:7.5.0").unwrap();
        assert_eq!(image.repository(), "confluentinc/confluent-local");
        assert_eq!(image.tag(), "7.5.0");
        assert!(image.is_confluent_local());
        assert_eq!(image.to_string(), "confluentinc/confluent-local:7.5.0");
    }

    #[test]
    fn test_parse_defaults_to_latest() {
        let image = ImageRef::parse("apache/kafka").unwrap();
        assert_eq!(image.tag(), "latest");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ImageRef::parse("localhost:5000/confluentinc/confluent-local").unwrap();
        assert_eq!(image.repository(), "localhost:5000/confluentinc/confluent-local");
        assert_eq!(image.tag(), "latest");
        assert!(image.is_confluent_local());

        let image = ImageRef::parse("localhost:5000/confluentinc/confluent-local:7.6.1").unwrap();
        assert_eq!(image.tag(), "7.6.1");
    }

    #[test]
    fn test_parse_digest() {
        let image = ImageRef::parse("apache/kafka:3.7.0@sha256:abc").unwrap();
        assert_eq!(image.tag(), "3.7.0");
        assert_eq!(image.to_string(), "apache/kafka:3.7.0@sha256:abc");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for reference in ["", "kafka:", ":7.5.0", "kafka@", "conf luent:1"] {
            assert!(
                matches!(
                    ImageRef::parse(reference),
                    Err(ConfigError::InvalidImageReference { .. })
                ),
                "{reference:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_version_parse_tag() {
        assert_eq!(Version::parse_tag("7.5.0"), Some(Version::new(7, 5, 0)));
        assert_eq!(Version::parse_tag("v7.6.1"), Some(Version::new(7, 6, 1)));
        assert_eq!(Version::parse_tag("7.4.0-1-ubi8"), Some(Version::new(7, 4, 0)));
        assert_eq!(Version::parse_tag("7"), Some(Version::new(7, 0, 0)));
        assert_eq!(Version::parse_tag("latest"), None);
        assert_eq!(Version::parse_tag("1.2.3.4"), None);
    }

    #[test]
    fn test_kraft_gate_rejects_old_confluent_local() {
        let image = ImageRef::parse("confluentinc/confluent-local:6.3.3").unwrap();
        match image.ensure_kraft_support() {
            Err(KafkaError::UnsupportedVersion {
                version, minimum, ..
            }) => {
                assert_eq!(version, "6.3.3");
                assert_eq!(minimum, "7.4.0");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_kraft_gate_accepts_supported_versions() {
        for reference in [
            "confluentinc/confluent-local:7.4.0",
            "confluentinc/confluent-local:7.5.0",
            "confluentinc/confluent-local:v7.6.1",
            "confluentinc/confluent-local:latest",
        ] {
            let image = ImageRef::parse(reference).unwrap();
            assert!(image.ensure_kraft_support().is_ok(), "{reference}");
        }
    }

    #[test]
    fn test_kraft_gate_ignores_other_images() {
        let image = ImageRef::parse("confluentinc/cp-kafka:6.0.0").unwrap();
        assert!(image.ensure_kraft_support().is_ok());
    }
}
