// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Receiver configuration file and sender group specs.
//!
//! The receiver reads a JSON5 file (comments and trailing commas allowed),
//! or YAML with the same keys when the file ends in `.yaml` / `.yml`:
//!
//! ```json5
//! {
//!   prometheus: { enabled: true, port: 9100 },
//!   multicast_channels: [
//!     { name: "feed-a", interface: "eth0", source_address: "10.0.0.1",
//!       group_address: "239.1.1.1", port: 5000 },
//!   ],
//! }
//! ```
//!
//! ```yaml
//! prometheus:
//!   enabled: true
//!   port: 9100
//! multicast_channels:
//!   - interface: eth0
//!     group_address: 239.1.1.1
//!     port: 5000
//! ```
//!
//! The sender takes groups on the command line as `239.1.2.3:5000@eth0` or
//! `[ff03::123]:5000@eth0`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::validation::{
    canonical_address, validate_interface_name, validate_multicast_address, validate_port,
};
use crate::error::GroupError;
use crate::logging::{Facility, Logger};
use crate::MulticastGroup;

/// Receiver configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReceiverConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Groups to join
    #[serde(default)]
    pub multicast_channels: Vec<MulticastGroup>,
}

/// Prometheus scrape endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: u16,
}

/// Receiver file syntax, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json5,
    /// `.yaml` / `.yml`
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json5,
        }
    }
}

impl ReceiverConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse_as(&content, ConfigFormat::from_path(path))
    }

    /// Parse JSON5 and canonicalise; call [`ReceiverConfig::validate`] afterwards.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::parse_as(content, ConfigFormat::Json5)
    }

    pub fn parse_as(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let mut config: ReceiverConfig = match format {
            ConfigFormat::Json5 => {
                json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
            }
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?,
        };
        for group in &mut config.multicast_channels {
            group.group_address = canonical_address(group.group_address);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multicast_channels.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let mut seen: HashMap<(String, IpAddr, u16), usize> = HashMap::new();
        for (idx, group) in self.multicast_channels.iter().enumerate() {
            validate_group(group, &format!("multicast channel {}", idx))?;

            let key = (group.interface.clone(), group.group_address, group.port);
            if let Some(prev_idx) = seen.get(&key) {
                return Err(ConfigError::DuplicateGroup {
                    interface: key.0,
                    group: key.1,
                    port: key.2,
                    indices: (*prev_idx, idx),
                });
            }
            seen.insert(key, idx);
        }

        if self.prometheus.enabled {
            validate_port(self.prometheus.port, "prometheus port").map_err(|reason| {
                ConfigError::InvalidPort {
                    port: self.prometheus.port,
                    reason,
                }
            })?;
        }

        Ok(())
    }
}

/// Check the invariants every group must hold before a loop may use it
pub fn validate_group(group: &MulticastGroup, context: &str) -> Result<(), ConfigError> {
    validate_interface_name(&group.interface).map_err(|reason| {
        ConfigError::InvalidInterfaceName {
            name: group.interface.clone(),
            reason,
        }
    })?;
    validate_port(group.port, &format!("port of {}", context)).map_err(|reason| {
        ConfigError::InvalidPort {
            port: group.port,
            reason,
        }
    })?;
    validate_multicast_address(group.group_address, context).map_err(|reason| {
        ConfigError::InvalidMulticastAddress {
            address: group.group_address,
            reason,
        }
    })?;
    Ok(())
}

/// Validation at loop entry: logs the rejection and maps it to a
/// [`GroupError`] of kind `Config`.
pub fn check_group(group: &MulticastGroup, logger: &Logger) -> Result<(), GroupError> {
    validate_group(group, &group.label()).map_err(|e| {
        logger.error(
            Facility::Config,
            &format!("Rejecting group {}: {}", group, e),
        );
        GroupError::config(group.to_string(), e)
    })
}

/// Parse a sender group spec: `address:port@interface`, IPv6 bracketed.
pub fn parse_group_spec(spec: &str) -> Result<MulticastGroup, ConfigError> {
    let (address_port, interface) =
        spec.rsplit_once('@')
            .ok_or_else(|| ConfigError::InvalidGroupSpec {
                spec: spec.to_string(),
                reason: "missing '@interface'".to_string(),
            })?;

    let socket_addr: SocketAddr =
        address_port
            .parse()
            .map_err(|_| ConfigError::InvalidGroupSpec {
                spec: spec.to_string(),
                reason: format!(
                    "'{}' is of unknown format; use 239.2.3.4:123 for IPv4 or [ff03::123]:123 for IPv6",
                    address_port
                ),
            })?;

    let group = MulticastGroup::new(
        interface,
        canonical_address(socket_addr.ip()),
        socket_addr.port(),
    );
    validate_group(&group, spec)?;
    Ok(group)
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(std::path::PathBuf, String),
    ParseError(String),
    NoGroups,
    InvalidGroupSpec {
        spec: String,
        reason: String,
    },
    DuplicateGroup {
        interface: String,
        group: IpAddr,
        port: u16,
        indices: (usize, usize),
    },
    InvalidInterfaceName {
        name: String,
        reason: String,
    },
    InvalidPort {
        port: u16,
        reason: String,
    },
    InvalidMulticastAddress {
        address: IpAddr,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to read config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::NoGroups => write!(f, "no multicast groups configured"),
            ConfigError::InvalidGroupSpec { spec, reason } => {
                write!(f, "invalid group '{}': {}", spec, reason)
            }
            ConfigError::DuplicateGroup {
                interface,
                group,
                port,
                indices,
            } => write!(
                f,
                "duplicate group {}:{} on {} (channels {} and {})",
                group, port, interface, indices.0, indices.1
            ),
            ConfigError::InvalidInterfaceName { name, reason } => {
                write!(f, "invalid interface name '{}': {}", name, reason)
            }
            ConfigError::InvalidPort { port, reason } => {
                write!(f, "invalid port {}: {}", port, reason)
            }
            ConfigError::InvalidMulticastAddress { address, reason } => {
                write!(f, "invalid multicast address {}: {}", address, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
