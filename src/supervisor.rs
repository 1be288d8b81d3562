// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Runs one task per group and feeds their reports to the aggregator.
//!
//! A failing group either stops the whole run ([`FailurePolicy::Exit`]) or
//! is restarted on its own after an exponential backoff
//! ([`FailurePolicy::Restart`]).

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, MetricsSink};
use crate::error::GroupError;
use crate::logging::Facility;
use crate::receiver::ReceiveLoop;
use crate::sender::{SendLoop, SendSettings};
use crate::{GroupReport, MulticastGroup, RunContext};

pub const INITIAL_BACKOFF_MS: u64 = 250;
pub const MAX_BACKOFF_MS: u64 = 16000; // 16 seconds
/// A loop that ran this long before failing starts over with a fresh budget
pub const STABLE_RUN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Sender(SendSettings),
    Receiver,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::Sender(_) => "sender",
            Role::Receiver => "receiver",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop every group on the first failure and return it
    #[default]
    Exit,
    /// Restart only the failed group, at most `max_restarts` times
    Restart { max_restarts: u32 },
}

/// Next restart delay: doubles up to [`MAX_BACKOFF_MS`]
pub fn next_backoff(current_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(MAX_BACKOFF_MS)
}

struct GroupSlot {
    group: MulticastGroup,
    restarts: u32,
    backoff_ms: u64,
}

impl GroupSlot {
    fn new(group: MulticastGroup) -> Self {
        Self {
            group,
            restarts: 0,
            backoff_ms: INITIAL_BACKOFF_MS,
        }
    }

    /// Forget earlier failures once the loop has been stable for
    /// [`STABLE_RUN`]. Returns true when the slot was reset.
    fn settle(&mut self, ran_for: Duration) -> bool {
        if ran_for < STABLE_RUN || (self.restarts == 0 && self.backoff_ms == INITIAL_BACKOFF_MS) {
            return false;
        }
        self.restarts = 0;
        self.backoff_ms = INITIAL_BACKOFF_MS;
        true
    }
}

/// Slot index, time spent in the loop after the start delay, and the result
type GroupOutcome = (usize, Duration, Result<(), GroupError>);

/// What every group task of one run shares
struct GroupSpawner {
    role: Role,
    ctx: RunContext,
    tx: UnboundedSender<GroupReport>,
    shutdown: CancellationToken,
}

impl GroupSpawner {
    fn spawn(
        &self,
        tasks: &mut JoinSet<GroupOutcome>,
        index: usize,
        group: MulticastGroup,
        delay: Duration,
    ) {
        let role = self.role.clone();
        let ctx = self.ctx.clone();
        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();

        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => return (index, Duration::ZERO, Ok(())),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let started = Instant::now();
            let result = match role {
                Role::Sender(settings) => match SendLoop::bind(group, settings, &ctx) {
                    Ok(send_loop) => send_loop.run(tx, shutdown).await,
                    Err(e) => Err(e),
                },
                Role::Receiver => match ReceiveLoop::join(group, &ctx) {
                    Ok(receive_loop) => receive_loop.run(tx, shutdown).await,
                    Err(e) => Err(e),
                },
            };
            (index, started.elapsed(), result)
        });
    }
}

/// Run every group until each one finishes or `shutdown` fires.
///
/// Returns the sink with everything the groups reported, or the first
/// failure that the policy does not absorb.
pub async fn run_groups<S: MetricsSink>(
    role: Role,
    groups: Vec<MulticastGroup>,
    ctx: &RunContext,
    sink: S,
    policy: FailurePolicy,
    shutdown: CancellationToken,
) -> Result<S> {
    let logger = &ctx.logger;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut aggregator = Aggregator::new(sink, ctx);
    let mut tasks = JoinSet::new();
    let mut slots: Vec<GroupSlot> = Vec::with_capacity(groups.len());

    logger.info(
        Facility::Supervisor,
        &format!("Starting {} {} group(s)", groups.len(), role.as_str()),
    );

    let spawner = GroupSpawner {
        role: role.clone(),
        ctx: ctx.clone(),
        tx,
        shutdown: shutdown.clone(),
    };

    for (index, group) in groups.into_iter().enumerate() {
        spawner.spawn(&mut tasks, index, group.clone(), Duration::ZERO);
        slots.push(GroupSlot::new(group));
    }

    let mut failure: Option<anyhow::Error> = None;

    while !tasks.is_empty() {
        tokio::select! {
            Some(report) = rx.recv() => aggregator.record(report),
            Some(joined) = tasks.join_next() => {
                let (index, ran_for, result) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        logger.critical(Facility::Supervisor, &format!("Group task panicked: {}", e));
                        shutdown.cancel();
                        failure.get_or_insert(anyhow!("group task panicked: {}", e));
                        continue;
                    }
                };
                let slot = &mut slots[index];

                let error = match result {
                    Ok(()) => {
                        logger.info(Facility::Supervisor, &format!("Group {} finished", slot.group));
                        continue;
                    }
                    Err(e) => e,
                };

                if shutdown.is_cancelled() {
                    logger.warning(
                        Facility::Supervisor,
                        &format!("Group {} failed during shutdown: {}", slot.group, error),
                    );
                    continue;
                }

                if slot.settle(ran_for) {
                    logger.info(
                        Facility::Supervisor,
                        &format!(
                            "Group {} ran for {}s before failing, resetting backoff",
                            slot.group,
                            ran_for.as_secs()
                        ),
                    );
                }

                match policy {
                    FailurePolicy::Restart { max_restarts } if slot.restarts < max_restarts => {
                        slot.restarts += 1;
                        logger.error(
                            Facility::Supervisor,
                            &format!(
                                "Group {} failed: {}. Restarting after {}ms ({}/{}).",
                                slot.group, error, slot.backoff_ms, slot.restarts, max_restarts
                            ),
                        );
                        spawner.spawn(
                            &mut tasks,
                            index,
                            slot.group.clone(),
                            Duration::from_millis(slot.backoff_ms),
                        );
                        slot.backoff_ms = next_backoff(slot.backoff_ms);
                    }
                    _ => {
                        logger.critical(
                            Facility::Supervisor,
                            &format!("Group {} failed: {}", slot.group, error),
                        );
                        shutdown.cancel();
                        failure.get_or_insert(anyhow::Error::new(error));
                    }
                }
            }
        }
    }

    // Every group task is gone; collect what they left in the channel.
    drop(spawner);
    while let Some(report) = rx.recv().await {
        aggregator.record(report);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(aggregator.into_sink()),
    }
}
