// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Fan-in of per-group reports into a [`MetricsSink`].
//!
//! Group tasks push [`GroupReport`]s onto one unbounded channel; the
//! aggregator is its only consumer, so sinks need no locking.

use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::logging::{Facility, Logger};
use crate::{GroupKey, GroupReport, MulticastGroupMetrics, RunContext};

pub trait MetricsSink: Send {
    fn record_sent(&mut self, key: &GroupKey, bytes: u64);
    fn record_received(&mut self, metrics: &MulticastGroupMetrics);
}

/// Running totals for one `(source, group, port)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounters {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub out_of_order: u64,
    pub last_latency_ns: i64,
    /// Size of the most recent datagram either way
    pub last_bytes: u64,
}

/// In-memory sink, used for tests and the shutdown summary
#[derive(Debug, Clone, Default)]
pub struct CounterTable {
    groups: HashMap<GroupKey, GroupCounters>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&GroupCounters> {
        self.groups.get(key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &GroupCounters)> {
        self.groups.iter()
    }

    /// Sum over every group
    pub fn totals(&self) -> GroupCounters {
        self.groups
            .values()
            .fold(GroupCounters::default(), |mut acc, c| {
                acc.packets_sent += c.packets_sent;
                acc.bytes_sent += c.bytes_sent;
                acc.packets_received += c.packets_received;
                acc.bytes_received += c.bytes_received;
                acc.out_of_order += c.out_of_order;
                acc
            })
    }
}

impl MetricsSink for CounterTable {
    fn record_sent(&mut self, key: &GroupKey, bytes: u64) {
        let counters = self.groups.entry(*key).or_default();
        counters.packets_sent += 1;
        counters.bytes_sent += bytes;
        counters.last_bytes = bytes;
    }

    fn record_received(&mut self, metrics: &MulticastGroupMetrics) {
        let key = GroupKey {
            source_address: Some(metrics.source_address),
            group_address: metrics.group_address,
            port: metrics.port,
        };
        let counters = self.groups.entry(key).or_default();
        counters.packets_received += 1;
        counters.bytes_received += metrics.bytes;
        if metrics.out_of_order {
            counters.out_of_order += 1;
        }
        counters.last_latency_ns = metrics.rx_latency_ns;
        counters.last_bytes = metrics.bytes;
    }
}

/// Both sinks at once: live export plus a local tally
impl<A: MetricsSink, B: MetricsSink> MetricsSink for (A, B) {
    fn record_sent(&mut self, key: &GroupKey, bytes: u64) {
        self.0.record_sent(key, bytes);
        self.1.record_sent(key, bytes);
    }

    fn record_received(&mut self, metrics: &MulticastGroupMetrics) {
        self.0.record_received(metrics);
        self.1.record_received(metrics);
    }
}

pub struct Aggregator<S: MetricsSink> {
    sink: S,
    logger: Logger,
    debug: bool,
}

impl<S: MetricsSink> Aggregator<S> {
    pub fn new(sink: S, ctx: &RunContext) -> Self {
        Self {
            sink,
            logger: ctx.logger.clone(),
            debug: ctx.debug,
        }
    }

    pub fn record(&mut self, report: GroupReport) {
        let key = report.key();
        match report {
            GroupReport::Sent(group) => {
                if self.debug {
                    self.logger.debug(
                        Facility::Aggregator,
                        &format!(
                            "Sent {} bytes to {}:{} on {}",
                            group.bytes, group.group_address, group.port, group.interface
                        ),
                    );
                }
                self.sink.record_sent(&key, group.bytes);
            }
            GroupReport::Received(metrics) => {
                if self.debug {
                    self.logger.debug(
                        Facility::Aggregator,
                        &format!(
                            "Received {} bytes from {} on {}:{} (out of order: {}, latency: {} ns)",
                            metrics.bytes,
                            metrics.source_address,
                            metrics.group_address,
                            metrics.port,
                            metrics.out_of_order,
                            metrics.rx_latency_ns
                        ),
                    );
                }
                self.sink.record_received(&metrics);
            }
        }
    }

    /// Drain `rx` until every sender is gone, then hand back the sink
    pub async fn run(mut self, mut rx: UnboundedReceiver<GroupReport>) -> S {
        while let Some(report) = rx.recv().await {
            self.record(report);
        }
        self.sink
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
