// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Nanoseconds-since-UTC-midnight timestamps.
//!
//! Sender and receiver each measure against their own midnight, so latency is
//! only meaningful when both clocks are synchronised. Skew shows up as
//! negative or implausibly large latency and is reported unchanged. A packet
//! sent just before midnight and received just after also reads as roughly
//! -24h; that is not compensated either.

use chrono::{DateTime, Timelike, Utc};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

pub fn nanos_since_midnight(now: DateTime<Utc>) -> i64 {
    i64::from(now.num_seconds_from_midnight()) * NANOS_PER_SECOND + i64::from(now.nanosecond())
}

/// Current time as nanoseconds since today's UTC midnight
pub fn timestamp_from_midnight() -> i64 {
    nanos_since_midnight(Utc::now())
}

/// One-way latency estimate. Negative values are clock skew, not errors.
#[inline]
pub fn rx_latency(packet_timestamp: i64, received_at: i64) -> i64 {
    received_at.saturating_sub(packet_timestamp)
}
