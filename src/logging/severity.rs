// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity levels for logging (syslog numbering)

use serde::{Deserialize, Serialize};

/// Log severity. Lower values are more severe, matching RFC 5424.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// A group task failed and the process is about to exit
    Critical = 2,
    /// Socket or transport failure on one group
    Error = 3,
    /// Degraded setup (interface without IFF_MULTICAST, restart scheduled)
    Warning = 4,
    /// Lifecycle milestones (group joined, sender bound)
    Notice = 5,
    /// Startup and shutdown information
    Info = 6,
    /// Per-packet traces
    Debug = 7,
}

impl Severity {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Create from u8 value (returns None for levels this crate never emits)
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(Severity::Critical),
            3 => Some(Severity::Error),
            4 => Some(Severity::Warning),
            5 => Some(Severity::Notice),
            6 => Some(Severity::Info),
            7 => Some(Severity::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
