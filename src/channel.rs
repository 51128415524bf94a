// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! The "latest wins" hand-off between the sampling task and every connected
//! session, grounded on the NTP daemon's `SystemSnapshot` watch channel: a
//! slow or absent reader never blocks the producer, and a reader that wakes
//! up after several ticks only ever observes the newest value (§4.3).

use std::sync::Arc;

use tokio::sync::watch;

use crate::snapshot::Snapshot;

/// Producer handle. Only the sampling task holds one.
#[derive(Clone)]
pub struct TelemetryPublisher {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

impl TelemetryPublisher {
    pub fn publish(&self, snapshot: Snapshot) {
        // send_replace never blocks and succeeds even with zero receivers,
        // matching the "broadcast regardless of subscriber count" semantics
        // the sampling loop requires.
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

/// Consumer handle. Each session clones one from [`TelemetryChannel`].
#[derive(Clone)]
pub struct TelemetrySubscriber {
    rx: watch::Receiver<Option<Arc<Snapshot>>>,
}

impl TelemetrySubscriber {
    /// Block until a snapshot newer than the last one observed arrives.
    /// Returns `None` only when the publisher has been dropped.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow().clone()
    }

    /// Non-blocking peek at the current value without marking it seen.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.rx.borrow().clone()
    }
}

/// Owns the watch channel; construct once at startup and hand out a
/// publisher to the sampling task and a subscriber to every session.
pub struct TelemetryChannel {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

impl TelemetryChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn publisher(&self) -> TelemetryPublisher {
        TelemetryPublisher { tx: self.tx.clone() }
    }

    pub fn subscriber(&self) -> TelemetrySubscriber {
        TelemetrySubscriber {
            rx: self.tx.subscribe(),
        }
    }

    /// Non-blocking peek at the latest snapshot without creating a new
    /// subscription, used by the command dispatcher to read `adminLevel`.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }
}

impl Default for TelemetryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AdminLevel, CpuReading, GpuReading, GpuVendor, RamReading, SCHEMA_VERSION};

    fn dummy_snapshot(timestamp_ms: i64) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp_ms,
            cpu: CpuReading {
                name: "x".into(),
                usage_percent: 0.0,
                temp_c: 0.0,
                clock_mhz: 0.0,
                power_w: None,
                cores: vec![],
            },
            gpu: GpuReading {
                name: "x".into(),
                vendor: GpuVendor::Unknown,
                usage_percent: 0.0,
                temp_c: 0.0,
                vram_used_gi_b: 0.0,
                vram_total_gi_b: 0.0,
                core_clock_mhz: 0.0,
                memory_clock_mhz: None,
                power_w: None,
                fan_rpm: None,
            },
            ram: RamReading {
                used_gi_b: 0.0,
                total_gi_b: 0.0,
                speed_mhz: None,
            },
            storage: vec![],
            network: None,
            gaming: None,
            admin_level: AdminLevel::Full,
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_latest_not_history() {
        let channel = TelemetryChannel::new();
        let publisher = channel.publisher();
        publisher.publish(dummy_snapshot(1));
        publisher.publish(dummy_snapshot(2));
        publisher.publish(dummy_snapshot(3));

        let mut subscriber = channel.subscriber();
        let snap = subscriber.next().await.unwrap();
        assert_eq!(snap.timestamp_ms, 3);
    }

    #[tokio::test]
    async fn subscriber_blocks_until_publish() {
        let channel = TelemetryChannel::new();
        let mut subscriber = channel.subscriber();
        assert!(subscriber.current().is_none());

        let publisher = channel.publisher();
        publisher.publish(dummy_snapshot(5));
        let snap = subscriber.next().await.unwrap();
        assert_eq!(snap.timestamp_ms, 5);
    }

    #[tokio::test]
    async fn dropping_publisher_ends_subscription() {
        let channel = TelemetryChannel::new();
        let mut subscriber = channel.subscriber();
        drop(channel);
        assert!(subscriber.next().await.is_none());
    }
}
