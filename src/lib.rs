// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub mod aggregator;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod receiver;
pub mod sender;
pub mod socket;
pub mod supervisor;
pub mod validation;

use logging::Logger;

/// One multicast group as configured, plus the size of its last transfer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MulticastGroup {
    #[serde(default)]
    pub name: String,
    pub interface: String,
    /// Expected sender (receiver side) or chosen local source (sender side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<IpAddr>,
    pub group_address: IpAddr,
    pub port: u16,
    /// Bytes moved by the most recent send or receive; not cumulative
    #[serde(skip)]
    pub bytes: u64,
}

impl MulticastGroup {
    pub fn new(interface: &str, group_address: IpAddr, port: u16) -> Self {
        Self {
            name: String::new(),
            interface: interface.to_string(),
            source_address: None,
            group_address,
            port,
            bytes: 0,
        }
    }

    /// `name` when set, otherwise `group:port@interface`
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.to_string()
        } else {
            self.name.clone()
        }
    }
}

impl std::fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group_address {
            IpAddr::V4(addr) => write!(f, "{}:{}@{}", addr, self.port, self.interface),
            IpAddr::V6(addr) => write!(f, "[{}]:{}@{}", addr, self.port, self.interface),
        }
    }
}

/// A single received datagram's measurements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastGroupMetrics {
    pub source_address: IpAddr,
    pub group_address: IpAddr,
    pub port: u16,
    pub bytes: u64,
    pub out_of_order: bool,
    /// Receive time minus packet timestamp; negative under clock skew
    pub rx_latency_ns: i64,
}

/// What group tasks push onto the fan-in channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupReport {
    Sent(MulticastGroup),
    Received(MulticastGroupMetrics),
}

impl GroupReport {
    pub fn key(&self) -> GroupKey {
        match self {
            GroupReport::Sent(group) => GroupKey {
                source_address: group.source_address,
                group_address: group.group_address,
                port: group.port,
            },
            GroupReport::Received(metrics) => GroupKey {
                source_address: Some(metrics.source_address),
                group_address: metrics.group_address,
                port: metrics.port,
            },
        }
    }
}

/// Metric label set: `(src_address, grp_address, port)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub source_address: Option<IpAddr>,
    pub group_address: IpAddr,
    pub port: u16,
}

impl GroupKey {
    pub fn source_label(&self) -> String {
        self.source_address
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }
}

/// Explicit per-run context handed to every component
#[derive(Debug, Clone)]
pub struct RunContext {
    pub logger: Logger,
    /// Log each decoded packet and each aggregated report
    pub debug: bool,
}

impl RunContext {
    pub fn new(logger: Logger, debug: bool) -> Self {
        if debug {
            logger.set_global_level(logging::Severity::Debug);
        }
        Self { logger, debug }
    }
}
