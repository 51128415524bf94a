// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Fans a telemetry snapshot out to every streaming session's outbound slot
//! (§4.7). Encodes once per tick, then the per-session write is a cheap
//! `Arc`-backed clone plus a watch `send_replace`.

use std::sync::Arc;

use tracing::warn;

use crate::channel::TelemetrySubscriber;
use crate::connection_manager::ConnectionManager;

pub async fn run(mut subscriber: TelemetrySubscriber, manager: Arc<ConnectionManager>, shutdown: Arc<tokio::sync::Notify>) {
    loop {
        tokio::select! {
            snapshot = subscriber.next() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                let frame = match serde_json::to_string(&*snapshot) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "failed to encode snapshot, skipping broadcast");
                        continue;
                    }
                };
                for session in manager.snapshot().await {
                    session.send_frame(frame.clone());
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}
