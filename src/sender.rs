// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-group send loop.
//!
//! ```text
//! Binding ──bind ok──▶ Sending ⟲ (send, report, random sleep)
//!    │                    │
//!    └──error──▶ GroupError └──send error──▶ GroupError
//! ```

use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::clock::timestamp_from_midnight;
use crate::codec::{encode, MessageKind};
use crate::config::check_group;
use crate::error::GroupError;
use crate::logging::{Facility, Logger};
use crate::socket::{resolve_interface, SenderSocket};
use crate::{GroupReport, MulticastGroup, RunContext};

pub const DEFAULT_TTL: u32 = 1;
pub const DEFAULT_INTERVAL_STEP: Duration = Duration::from_millis(10);
pub const DEFAULT_INTERVAL_SLOTS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSettings {
    /// Multicast TTL (IPv4) or hop limit (IPv6)
    pub ttl: u32,
    pub interval_step: Duration,
    /// Sleep is `rand(0..interval_slots) * interval_step`
    pub interval_slots: u64,
    /// Stop after this many packets; run until shutdown when `None`
    pub count: Option<u64>,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            interval_step: DEFAULT_INTERVAL_STEP,
            interval_slots: DEFAULT_INTERVAL_SLOTS,
            count: None,
        }
    }
}

impl SendSettings {
    /// True once `sent` packets satisfy `count`; never without a count
    pub fn count_reached(&self, sent: u64) -> bool {
        self.count.is_some_and(|count| sent >= count)
    }

    pub fn next_interval<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.interval_slots == 0 {
            return Duration::ZERO;
        }
        let slot = rng.gen_range(0..self.interval_slots);
        self.interval_step
            .saturating_mul(u32::try_from(slot).unwrap_or(u32::MAX))
    }
}

/// A group with a bound sender socket
#[derive(Debug)]
pub struct SendLoop {
    socket: SenderSocket,
    group: MulticastGroup,
    settings: SendSettings,
    logger: Logger,
    debug: bool,
}

impl SendLoop {
    /// Resolve the interface, pick a source address and bind to it
    pub fn bind(
        mut group: MulticastGroup,
        settings: SendSettings,
        ctx: &RunContext,
    ) -> Result<Self, GroupError> {
        check_group(&group, &ctx.logger)?;
        let interface = resolve_interface(&group.interface)
            .map_err(|e| GroupError::interface(group.to_string(), e))?;
        if let Some(reason) = interface.multicast_unsupported_reason() {
            ctx.logger.warning(
                Facility::Network,
                &format!("Interface {} may not send multicast: {}", interface.name, reason),
            );
        }

        let socket = SenderSocket::open(&group, &interface, settings.ttl)?;
        group.source_address = Some(socket.source().ip());

        ctx.logger.notice(
            Facility::Sender,
            &format!("Sending to group {} from {}", group, socket.source()),
        );

        Ok(Self {
            socket,
            group,
            settings,
            logger: ctx.logger.clone(),
            debug: ctx.debug,
        })
    }

    pub fn group(&self) -> &MulticastGroup {
        &self.group
    }

    /// Send until `count` packets are out, `shutdown` fires or the report
    /// channel closes
    pub async fn run(
        mut self,
        tx: UnboundedSender<GroupReport>,
        shutdown: CancellationToken,
    ) -> Result<(), GroupError> {
        let mut sequence: u64 = 0;

        while !shutdown.is_cancelled() && !self.settings.count_reached(sequence) {
            let payload = encode(timestamp_from_midnight(), sequence, MessageKind::Test);
            let sent = self
                .socket
                .send(&payload)
                .await
                .map_err(|e| GroupError::transport(self.group.to_string(), e))?;

            if self.debug {
                self.logger.debug(
                    Facility::Sender,
                    &format!("Sent sequence {} ({} bytes) to {}", sequence, sent, self.group),
                );
            }

            self.group.bytes = sent as u64;
            if tx.send(GroupReport::Sent(self.group.clone())).is_err() {
                break;
            }

            sequence = sequence.wrapping_add(1);
            if self.settings.count_reached(sequence) {
                break;
            }

            let interval = self.settings.next_interval(&mut rand::thread_rng());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.logger.info(
            Facility::Sender,
            &format!("Stopped sending to {} after {} packets", self.group, sequence),
        );
        Ok(())
    }
}
