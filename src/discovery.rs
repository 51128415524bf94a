// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Best-effort UDP discovery beacon (§4.10). Failures to send are logged
//! and never propagate; losing the beacon must not affect sampling or
//! client sessions.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::snapshot::SCHEMA_VERSION;

const BEACON_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct Beacon<'a> {
    service: &'a str,
    port: u16,
    host: String,
    #[serde(rename = "schemaVersion")]
    schema_version: &'a str,
}

pub async fn run(port: u16, discovery_port: u16, shutdown: Arc<tokio::sync::Notify>) {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "discovery beacon disabled: could not bind UDP socket");
            return;
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        warn!(error = %e, "discovery beacon disabled: could not enable broadcast");
        return;
    }

    let host = hostname();
    let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), discovery_port);
    let beacon = Beacon {
        service: "neonlink",
        port,
        host,
        schema_version: SCHEMA_VERSION,
    };
    let payload = match serde_json::to_vec(&beacon) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "discovery beacon disabled: could not encode payload");
            return;
        }
    };

    let mut ticker = tokio::time::interval(BEACON_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match socket.send_to(&payload, target).await {
                    Ok(_) => debug!("discovery beacon sent"),
                    Err(e) => warn!(error = %e, "discovery beacon send failed"),
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_serializes_with_expected_shape() {
        let beacon = Beacon {
            service: "neonlink",
            port: 9876,
            host: "test-host".to_string(),
            schema_version: SCHEMA_VERSION,
        };
        let value = serde_json::to_value(&beacon).unwrap();
        assert_eq!(value["service"], "neonlink");
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
    }
}
