// SPDX-License-Identifier: Apache-2.0 OR MIT
//! # Metrics Module
//!
//! Exposes per-group counters to Prometheus through the `metrics` facade.
//! Without an installed recorder every call here is a no-op.

use ::metrics::{counter, describe_counter, describe_gauge, gauge};
use anyhow::Result;
use std::net::SocketAddr;

use crate::aggregator::MetricsSink;
use crate::{GroupKey, MulticastGroupMetrics};

pub const PACKETS_RECEIVED: &str = "multicast_packets_received";
pub const BYTES_RECEIVED: &str = "multicast_bytes_received";
pub const PACKETS_OUT_OF_ORDER: &str = "multicast_packets_out_of_order";
pub const PACKETS_SENT: &str = "multicast_packets_sent";
pub const BYTES_SENT: &str = "multicast_bytes_sent";
pub const LATENCY: &str = "multicast_latency_ns";

#[cfg(not(test))]
pub fn install_prometheus_recorder(prometheus_addr: SocketAddr) -> Result<()> {
    use anyhow::Context;
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(prometheus_addr)
        .install()
        .with_context(|| format!("failed to start Prometheus exporter on {}", prometheus_addr))?;
    describe_metrics();
    Ok(())
}

#[cfg(test)]
pub fn install_prometheus_recorder(_prometheus_addr: SocketAddr) -> Result<()> {
    // Do nothing in tests to avoid starting a server and hanging.
    Ok(())
}

pub fn describe_metrics() {
    describe_counter!(PACKETS_RECEIVED, "Multicast packets received");
    describe_counter!(BYTES_RECEIVED, "Multicast bytes received");
    describe_counter!(
        PACKETS_OUT_OF_ORDER,
        "Packets whose sequence number did not follow the previous one"
    );
    describe_counter!(PACKETS_SENT, "Multicast packets sent");
    describe_counter!(BYTES_SENT, "Multicast bytes sent");
    describe_gauge!(
        LATENCY,
        "Latency of the last packet received, from midnight-based timestamps"
    );
}

/// Label values shared by every series
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeriesLabels {
    src_address: String,
    grp_address: String,
    port: String,
}

impl SeriesLabels {
    fn new(key: &GroupKey) -> Self {
        Self {
            src_address: key.source_label(),
            grp_address: key.group_address.to_string(),
            port: key.port.to_string(),
        }
    }
}

/// Sink that forwards everything to the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record_sent(&mut self, key: &GroupKey, bytes: u64) {
        let l = SeriesLabels::new(key);
        counter!(PACKETS_SENT, "src_address" => l.src_address.clone(), "grp_address" => l.grp_address.clone(), "port" => l.port.clone())
            .increment(1);
        counter!(BYTES_SENT, "src_address" => l.src_address, "grp_address" => l.grp_address, "port" => l.port)
            .increment(bytes);
    }

    fn record_received(&mut self, metrics: &MulticastGroupMetrics) {
        let l = SeriesLabels::new(&GroupKey {
            source_address: Some(metrics.source_address),
            group_address: metrics.group_address,
            port: metrics.port,
        });
        counter!(PACKETS_RECEIVED, "src_address" => l.src_address.clone(), "grp_address" => l.grp_address.clone(), "port" => l.port.clone())
            .increment(1);
        counter!(BYTES_RECEIVED, "src_address" => l.src_address.clone(), "grp_address" => l.grp_address.clone(), "port" => l.port.clone())
            .increment(metrics.bytes);
        if metrics.out_of_order {
            counter!(PACKETS_OUT_OF_ORDER, "src_address" => l.src_address.clone(), "grp_address" => l.grp_address.clone(), "port" => l.port.clone())
                .increment(1);
        }
        gauge!(LATENCY, "src_address" => l.src_address, "grp_address" => l.grp_address, "port" => l.port)
            .set(metrics.rx_latency_ns as f64);
    }
}
