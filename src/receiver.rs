// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-group receive loop.
//!
//! ```text
//! Joining ──join ok──▶ Listening ──shutdown / channel closed──▶ Closed
//!    │                     │
//!    └──error──▶ GroupError └──read error──▶ GroupError
//! ```
//!
//! Every datagram is decoded, checked against the group it was addressed
//! to, sequence-checked and turned into one [`MulticastGroupMetrics`].

use std::net::{IpAddr, SocketAddr};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::clock::{rx_latency, timestamp_from_midnight};
use crate::codec::{decode, RECV_BUFFER_SIZE};
use crate::config::check_group;
use crate::error::GroupError;
use crate::logging::{Facility, Logger};
use crate::socket::{resolve_interface, ReceiverSocket};
use crate::validation::canonical_address;
use crate::{GroupReport, MulticastGroup, MulticastGroupMetrics, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Joining,
    Listening,
    Closed,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverState::Joining => write!(f, "joining"),
            ReceiverState::Listening => write!(f, "listening"),
            ReceiverState::Closed => write!(f, "closed"),
        }
    }
}

/// Detects gaps and reordering in a group's sequence numbers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    previous: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `sequence` does not directly follow the previous
    /// one. The first observation is always in order.
    pub fn observe(&mut self, sequence: u64) -> bool {
        let out_of_order = match self.previous {
            None => false,
            Some(previous) => previous.checked_add(1) != Some(sequence),
        };
        self.previous = Some(sequence);
        out_of_order
    }

    pub fn previous(&self) -> Option<u64> {
        self.previous
    }
}

/// The socket-free half of the receive loop
#[derive(Debug)]
pub struct PacketProcessor {
    group: MulticastGroup,
    group_address: IpAddr,
    tracker: SequenceTracker,
    logger: Logger,
    debug: bool,
}

impl PacketProcessor {
    pub fn new(group: MulticastGroup, ctx: &RunContext) -> Self {
        Self {
            group_address: canonical_address(group.group_address),
            group,
            tracker: SequenceTracker::new(),
            logger: ctx.logger.clone(),
            debug: ctx.debug,
        }
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// Turn one datagram into metrics, or `None` if it is discarded.
    ///
    /// `received_at` is nanoseconds since midnight at the time of the read.
    pub fn process(
        &mut self,
        payload: &[u8],
        source: SocketAddr,
        destination: Option<IpAddr>,
        received_at: i64,
    ) -> Option<MulticastGroupMetrics> {
        let message = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.logger.debug(
                    Facility::Receiver,
                    &format!("Discarding datagram from {} for {}: {}", source, self.group, e),
                );
                return None;
            }
        };

        if self.debug {
            self.logger.debug(
                Facility::Receiver,
                &format!("Received message {} from {} for {}", message, source, self.group),
            );
        }

        let destination = destination.map(canonical_address);
        if destination != Some(self.group_address) {
            self.logger.debug(
                Facility::Receiver,
                &format!(
                    "Ignoring datagram for {} on socket of {}",
                    destination
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|| "unknown destination".to_string()),
                    self.group
                ),
            );
            return None;
        }

        let out_of_order = self.tracker.observe(message.sequence);

        Some(MulticastGroupMetrics {
            source_address: canonical_address(source.ip()),
            group_address: self.group_address,
            port: self.group.port,
            bytes: payload.len() as u64,
            out_of_order,
            rx_latency_ns: rx_latency(message.timestamp, received_at),
        })
    }
}

/// A joined group, ready to listen
#[derive(Debug)]
pub struct ReceiveLoop {
    socket: ReceiverSocket,
    processor: PacketProcessor,
    group: MulticastGroup,
    logger: Logger,
}

impl ReceiveLoop {
    /// Resolve the interface, open the socket and join the group
    pub fn join(group: MulticastGroup, ctx: &RunContext) -> Result<Self, GroupError> {
        let logger = ctx.logger.clone();
        log_state(&logger, &group, ReceiverState::Joining);
        check_group(&group, &logger)?;

        let interface = resolve_interface(&group.interface)
            .map_err(|e| GroupError::interface(group.to_string(), e))?;
        if let Some(reason) = interface.multicast_unsupported_reason() {
            logger.warning(
                Facility::Network,
                &format!("Interface {} may not deliver multicast: {}", interface.name, reason),
            );
        }

        let socket = ReceiverSocket::open(&group, &interface)?;

        logger.notice(
            Facility::Receiver,
            &format!("Ready to receive packets for group {}", group),
        );

        Ok(Self {
            socket,
            processor: PacketProcessor::new(group.clone(), ctx),
            group,
            logger,
        })
    }

    pub fn group(&self) -> &MulticastGroup {
        &self.group
    }

    /// Listen until `shutdown` fires or the report channel closes
    pub async fn run(
        mut self,
        tx: UnboundedSender<GroupReport>,
        shutdown: CancellationToken,
    ) -> Result<(), GroupError> {
        log_state(&self.logger, &self.group, ReceiverState::Listening);
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            let datagram = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.socket.recv(&mut buf) => {
                    result.map_err(|e| GroupError::transport(self.group.to_string(), e))?
                }
            };

            let received_at = timestamp_from_midnight();
            let Some(metrics) = self.processor.process(
                &buf[..datagram.len],
                datagram.source,
                datagram.destination,
                received_at,
            ) else {
                continue;
            };

            if tx.send(GroupReport::Received(metrics)).is_err() {
                break;
            }
        }

        if let Err(e) = self.socket.leave() {
            self.logger.warning(
                Facility::Network,
                &format!("Failed to leave group {}: {}", self.group, e),
            );
        }
        log_state(&self.logger, &self.group, ReceiverState::Closed);
        Ok(())
    }
}

fn log_state(logger: &Logger, group: &MulticastGroup, state: ReceiverState) {
    let group_label = group.label();
    let state_label = state.to_string();
    logger.log_kv(
        crate::logging::Severity::Info,
        Facility::Receiver,
        "Receiver state changed",
        &[("group", &group_label), ("state", &state_label)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, MessageKind};
    use crate::logging::MemoryWriter;
    use std::sync::Arc;

    fn context() -> (RunContext, MemoryWriter) {
        let writer = MemoryWriter::new();
        let logger = Logger::with_writer(Arc::new(writer.clone()));
        (RunContext::new(logger, true), writer)
    }

    fn processor() -> (PacketProcessor, MemoryWriter) {
        let (ctx, writer) = context();
        let group = MulticastGroup::new("eth0", "239.1.1.1".parse().unwrap(), 5000);
        (PacketProcessor::new(group, &ctx), writer)
    }

    fn source() -> SocketAddr {
        "10.0.0.1:40000".parse().unwrap()
    }

    fn group_dst() -> Option<IpAddr> {
        Some("239.1.1.1".parse().unwrap())
    }

    #[test]
    fn test_sequence_gaps() {
        let mut tracker = SequenceTracker::new();
        let flags: Vec<bool> = [5, 6, 7, 9, 10].iter().map(|n| tracker.observe(*n)).collect();
        assert_eq!(flags, vec![false, false, false, true, false]);
    }

    #[test]
    fn test_first_packet_is_in_order() {
        for first in [0, 1, 17, u64::MAX] {
            let mut tracker = SequenceTracker::new();
            assert!(!tracker.observe(first));
            assert_eq!(tracker.previous(), Some(first));
        }
    }

    #[test]
    fn test_sequence_zero_is_a_real_value() {
        let mut tracker = SequenceTracker::new();
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(1));
        assert!(tracker.observe(0));
    }

    #[test]
    fn test_backwards_and_wrap_are_out_of_order() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(10);
        assert!(tracker.observe(3));
        assert!(!tracker.observe(4));

        let mut tracker = SequenceTracker::new();
        tracker.observe(u64::MAX);
        assert!(tracker.observe(0));
    }

    #[test]
    fn test_process_emits_metrics() {
        let (mut processor, _) = processor();
        let payload = encode(1_000, 0, MessageKind::Test);

        let metrics = processor
            .process(&payload, source(), group_dst(), 1_000_001_000)
            .unwrap();

        assert_eq!(metrics.source_address, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(metrics.group_address, "239.1.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(metrics.port, 5000);
        assert_eq!(metrics.bytes, 18);
        assert!(!metrics.out_of_order);
        assert_eq!(metrics.rx_latency_ns, 1_000_000_000);
    }

    #[test]
    fn test_future_timestamp_gives_negative_latency() {
        let (mut processor, _) = processor();
        let payload = encode(5_000, 0, MessageKind::Test);

        let metrics = processor.process(&payload, source(), group_dst(), 4_000).unwrap();
        assert_eq!(metrics.rx_latency_ns, -1_000);
    }

    #[test]
    fn test_cross_talk_does_not_advance_tracker() {
        let (mut processor, writer) = processor();

        let first = encode(0, 1, MessageKind::Test);
        assert!(processor.process(&first, source(), group_dst(), 0).is_some());

        let foreign = encode(0, 50, MessageKind::Test);
        let other_group = Some("239.2.2.2".parse().unwrap());
        assert!(processor.process(&foreign, source(), other_group, 0).is_none());
        assert!(processor.process(&foreign, source(), None, 0).is_none());
        assert_eq!(processor.tracker().previous(), Some(1));
        assert!(writer.contains("Ignoring datagram for 239.2.2.2"));

        let next = encode(0, 2, MessageKind::Test);
        let metrics = processor.process(&next, source(), group_dst(), 0).unwrap();
        assert!(!metrics.out_of_order);
    }

    #[test]
    fn test_mapped_destination_matches_group() {
        let (mut processor, _) = processor();
        let payload = encode(0, 1, MessageKind::Test);
        let mapped = Some("::ffff:239.1.1.1".parse().unwrap());
        assert!(processor.process(&payload, source(), mapped, 0).is_some());
    }

    #[test]
    fn test_short_datagram_is_discarded() {
        let (mut processor, writer) = processor();
        assert!(processor.process(&[0u8; 10], source(), group_dst(), 0).is_none());
        assert_eq!(processor.tracker().previous(), None);
        assert!(writer.contains("Discarding datagram"));
    }

    #[test]
    fn test_out_of_order_reported() {
        let (mut processor, _) = processor();
        for (sequence, expected) in [(5, false), (6, false), (8, true), (9, false)] {
            let payload = encode(0, sequence, MessageKind::Test);
            let metrics = processor.process(&payload, source(), group_dst(), 0).unwrap();
            assert_eq!(metrics.out_of_order, expected, "sequence {}", sequence);
        }
    }

    #[test]
    fn test_join_rejects_invalid_group() {
        let (ctx, writer) = context();
        let group = MulticastGroup::new("lo", "10.0.0.1".parse().unwrap(), 5000);
        let err = ReceiveLoop::join(group, &ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Config);
        assert!(writer.contains("Rejecting group"));
    }

    #[test]
    fn test_join_unknown_interface_fails() {
        let (ctx, _) = context();
        let group = MulticastGroup::new("nosuchif0", "239.1.1.1".parse().unwrap(), 5000);
        let err = ReceiveLoop::join(group, &ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Interface);
        assert!(err.to_string().contains("interface not found: nosuchif0"));
    }
}
