// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Ticker-driven producer (§4.8). No catch-up: if a sample overruns its
//! period the next tick simply fires late and a drop is counted, it never
//! bursts to make up lost ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::channel::TelemetryPublisher;
use crate::clock::Clock;
use crate::config::SharedConfig;
use crate::sampler::Sampler;

/// Exposed through `get_status` so operators can see sampler health without
/// the dropped tick surfacing as a client-visible error.
#[derive(Default)]
pub struct SamplingStats {
    pub dropped_ticks: AtomicU64,
}

pub async fn run(
    sampler: Arc<Mutex<Box<dyn Sampler>>>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    publisher: TelemetryPublisher,
    stats: Arc<SamplingStats>,
    shutdown: Arc<tokio::sync::Notify>,
) {
    let mut current_interval_ms = config.load().server.polling_interval_ms;
    let mut ticker = tokio::time::interval(Duration::from_millis(current_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let new_interval_ms = config.load().server.polling_interval_ms;
                if new_interval_ms != current_interval_ms {
                    current_interval_ms = new_interval_ms;
                    ticker = tokio::time::interval(Duration::from_millis(current_interval_ms));
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    continue;
                }

                let hardware = config.load().hardware.clone();
                let mut guard = sampler.lock().await;
                match guard.sample(&hardware) {
                    Ok(mut snapshot) => {
                        snapshot.timestamp_ms = clock.now_ms();
                        publisher.publish(snapshot);
                    }
                    Err(e) => {
                        stats.dropped_ticks.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "sample failed, skipping tick");
                    }
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::sampler::MockSampler;

    #[tokio::test]
    async fn publishes_snapshots_at_least_once() {
        let sampler: Arc<Mutex<Box<dyn Sampler>>> = Arc::new(Mutex::new(Box::new(MockSampler::new(1))));
        let mut config = Config::default();
        config.server.polling_interval_ms = 50;
        let config = SharedConfig::new(config);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let channel = crate::channel::TelemetryChannel::new();
        let mut subscriber = channel.subscriber();
        let stats = Arc::new(SamplingStats::default());
        let shutdown = Arc::new(tokio::sync::Notify::new());

        let task = tokio::spawn(run(sampler, config, clock, channel.publisher(), stats, shutdown.clone()));
        let snapshot = tokio::time::timeout(Duration::from_secs(1), subscriber.next())
            .await
            .expect("snapshot within timeout")
            .unwrap();
        assert!(snapshot.timestamp_ms > 0);

        shutdown.notify_waiters();
        let _ = task.await;
    }
}
