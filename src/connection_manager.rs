// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Owns the session set and the admission decision (§4.5, §4.6). Broadcasts
//! take a read lock for the duration of one fan-out pass; add/remove take a
//! write lock briefly, mirroring the lock discipline the design doc
//! specifies for the session map.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::security::{is_addr_admitted, SharedTokenBucket};
use crate::session::{ClientSession, SessionId};

pub enum AdmissionError {
    RejectedIp,
    Capacity,
}

pub struct ConnectionManager {
    sessions: RwLock<HashMap<SessionId, Arc<ClientSession>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Admission check for a not-yet-accepted peer (§4.5 steps 1-2). Does
    /// not register the session; the caller does that once the WebSocket
    /// upgrade actually completes.
    pub async fn admit(&self, addr: IpAddr, config: &Config) -> Result<(), AdmissionError> {
        if !is_addr_admitted(addr, config.security.allow_external_ip) {
            return Err(AdmissionError::RejectedIp);
        }
        let sessions = self.sessions.read().await;
        if sessions.len() >= config.server.max_connections {
            return Err(AdmissionError::Capacity);
        }
        Ok(())
    }

    pub async fn register(
        &self,
        remote_addr: std::net::SocketAddr,
        connected_at_ms: i64,
        rate_limit_per_minute: u32,
    ) -> (Arc<ClientSession>, crate::session::OutboundSlotReceiver) {
        let bucket = SharedTokenBucket::new(rate_limit_per_minute, rate_limit_per_minute, Instant::now());
        let (session, receiver) = ClientSession::new(remote_addr, connected_at_ms, bucket);
        let session = Arc::new(session);
        self.sessions.write().await.insert(session.id, session.clone());
        info!(session_id = %session.id, remote = %remote_addr, "session registered");
        (session, receiver)
    }

    pub async fn remove(&self, id: SessionId) {
        if self.sessions.write().await.remove(&id).is_some() {
            info!(session_id = %id, "session removed");
        }
    }

    /// Snapshot of the currently registered sessions for broadcast fan-out.
    /// Returned as an owned `Vec` of `Arc` clones so the broadcaster never
    /// holds the read lock while writing to an individual outbound slot.
    pub async fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Signal every session idle past `pingTimeoutMs` to close itself and
    /// drop it from the registry. The signal (not just the registry removal)
    /// is what actually unwinds the session's rx/tx task pair and closes its
    /// socket; each session's own rx loop also runs this same check on a
    /// heartbeat ticker so a silent-forever client doesn't wait on this
    /// sweep alone. Returns the ids removed so the caller can log or count
    /// them.
    pub async fn sweep_idle(&self, now_ms: i64, timeout_ms: u64) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<(SessionId, Arc<ClientSession>)> = sessions
            .iter()
            .filter(|(_, s)| s.is_idle_past(now_ms, timeout_ms))
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        for (id, session) in &expired {
            sessions.remove(id);
            session.request_close("idle_timeout");
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn admits_loopback_and_rejects_public_without_flag() {
        let manager = ConnectionManager::new();
        let config = Config::default();
        assert!(manager.admit("127.0.0.1".parse().unwrap(), &config).await.is_ok());
        assert!(matches!(
            manager.admit("8.8.8.8".parse().unwrap(), &config).await,
            Err(AdmissionError::RejectedIp)
        ));
    }

    #[tokio::test]
    async fn enforces_max_connections() {
        let manager = ConnectionManager::new();
        let mut config = Config::default();
        config.server.max_connections = 1;
        manager.register("127.0.0.1:1".parse().unwrap(), 0, 60).await;
        assert!(matches!(
            manager.admit("127.0.0.1".parse().unwrap(), &config).await,
            Err(AdmissionError::Capacity)
        ));
    }

    #[tokio::test]
    async fn sweep_idle_removes_only_expired_sessions() {
        let manager = ConnectionManager::new();
        let (fresh, _rx1) = manager.register("127.0.0.1:1".parse().unwrap(), 10_000, 60).await;
        let (stale, _rx2) = manager.register("127.0.0.1:2".parse().unwrap(), 0, 60).await;
        stale.touch_rx(0);
        fresh.touch_rx(10_000);

        let expired = manager.sweep_idle(20_000, 5_000).await;
        assert_eq!(expired, vec![stale.id]);
        assert_eq!(manager.len().await, 1);
    }
}
