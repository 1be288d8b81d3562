// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Same-host end-to-end run: one sender and one receiver on the same group.
//!
//! Loopback always runs. The run over a non-loopback multicast interface
//! skips itself when the host has none.

use multicast_tester::aggregator::{Aggregator, CounterTable};
use multicast_tester::logging::{Logger, MemoryWriter};
use multicast_tester::receiver::ReceiveLoop;
use multicast_tester::sender::{SendLoop, SendSettings};
use multicast_tester::socket::{list_interfaces, GroupFamily, InterfaceInfo};
use multicast_tester::{GroupKey, MulticastGroup, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn loopback_interface() -> InterfaceInfo {
    list_interfaces()
        .into_iter()
        .find(|iface| {
            iface.is_up() && iface.is_loopback() && iface.source_address(GroupFamily::V4).is_some()
        })
        .expect("host has no IPv4 loopback interface")
}

fn multicast_interface() -> Option<InterfaceInfo> {
    list_interfaces().into_iter().find(|iface| {
        iface.is_up()
            && !iface.is_loopback()
            && iface.is_multicast()
            && iface.source_address(GroupFamily::V4).is_some()
    })
}

fn context() -> RunContext {
    RunContext::new(Logger::with_writer(Arc::new(MemoryWriter::new())), false)
}

/// Send five packets to `group:port` on `iface` and check what came back
async fn assert_five_packets_delivered(iface: &str, group_address: &str, port: u16) {
    let ctx = context();
    let group = MulticastGroup::new(iface, group_address.parse().unwrap(), port);

    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let receive_loop = ReceiveLoop::join(group.clone(), &ctx).unwrap();
    let receiver = tokio::spawn(receive_loop.run(tx.clone(), shutdown.clone()));

    let settings = SendSettings {
        interval_step: Duration::from_millis(1),
        interval_slots: 5,
        count: Some(5),
        ..SendSettings::default()
    };
    let send_loop = SendLoop::bind(group.clone(), settings, &ctx).unwrap();
    let source = send_loop.group().source_address;
    send_loop.run(tx, shutdown.clone()).await.unwrap();

    // Let the last datagram cross the stack before stopping the receiver.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    receiver.await.unwrap().unwrap();

    let table = Aggregator::new(CounterTable::new(), &ctx).run(rx).await;
    let counters = table
        .get(&GroupKey {
            source_address: source,
            group_address: group.group_address,
            port: group.port,
        })
        .copied()
        .unwrap();

    assert_eq!(counters.packets_sent, 5);
    assert_eq!(counters.bytes_sent, 90);
    assert_eq!(counters.packets_received, 5);
    assert_eq!(counters.bytes_received, 90);
    assert_eq!(counters.last_bytes, 18);
    assert_eq!(counters.out_of_order, 0);
}

#[tokio::test]
#[cfg_attr(tarpaulin, ignore)]
async fn test_same_host_over_loopback() {
    let lo = loopback_interface();
    assert_five_packets_delivered(&lo.name, "239.5.5.5", 20000).await;
}

#[tokio::test]
#[cfg_attr(tarpaulin, ignore)]
async fn test_same_host_over_multicast_interface() {
    let Some(iface) = multicast_interface() else {
        eprintln!("Skipping test_same_host_over_multicast_interface: no multicast-capable interface");
        return;
    };
    assert_five_packets_delivered(&iface.name, "239.5.5.6", 20005).await;
}

#[tokio::test]
#[cfg_attr(tarpaulin, ignore)]
async fn test_receiver_ignores_other_group_on_same_port() {
    let iface = loopback_interface();
    let ctx = context();
    let wanted = MulticastGroup::new(&iface.name, "239.5.5.7".parse().unwrap(), 20010);
    let other = MulticastGroup::new(&iface.name, "239.5.5.8".parse().unwrap(), 20010);

    let (rx_tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    // Both joined on one port: each socket sees the other group's traffic.
    let wanted_loop = ReceiveLoop::join(wanted.clone(), &ctx).unwrap();
    let other_loop = ReceiveLoop::join(other.clone(), &ctx).unwrap();
    let (other_tx, _other_rx) = mpsc::unbounded_channel();
    let wanted_task = tokio::spawn(wanted_loop.run(rx_tx, shutdown.clone()));
    let other_task = tokio::spawn(other_loop.run(other_tx, shutdown.clone()));

    let settings = SendSettings {
        interval_step: Duration::from_millis(1),
        interval_slots: 2,
        count: Some(3),
        ..SendSettings::default()
    };
    let (sent_tx, _sent_rx) = mpsc::unbounded_channel();
    SendLoop::bind(other, settings, &ctx)
        .unwrap()
        .run(sent_tx, shutdown.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    wanted_task.await.unwrap().unwrap();
    other_task.await.unwrap().unwrap();

    let table = Aggregator::new(CounterTable::new(), &ctx).run(rx).await;
    assert!(table.is_empty(), "cross-talk reached the wrong group: {:?}", table);
}
