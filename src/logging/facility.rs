// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Identifies which component produced a log line
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// Task spawning, failure policy, shutdown
    Supervisor = 0,
    /// Config file and CLI group parsing
    Config = 1,
    /// Interface lookup, socket options, join/leave
    Network = 2,
    /// Per-group send loops
    Sender = 3,
    /// Per-group receive loops
    Receiver = 4,
    /// Fan-in consumer
    Aggregator = 5,
    /// Prometheus exposition
    Metrics = 6,
    /// Test harness
    Test = 7,
}

impl Facility {
    pub const ALL: [Facility; 8] = [
        Facility::Supervisor,
        Facility::Config,
        Facility::Network,
        Facility::Sender,
        Facility::Receiver,
        Facility::Aggregator,
        Facility::Metrics,
        Facility::Test,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Supervisor => "Supervisor",
            Facility::Config => "Config",
            Facility::Network => "Network",
            Facility::Sender => "Sender",
            Facility::Receiver => "Receiver",
            Facility::Aggregator => "Aggregator",
            Facility::Metrics => "Metrics",
            Facility::Test => "Test",
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Facility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Facility::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown logging facility '{}'", s))
    }
}
