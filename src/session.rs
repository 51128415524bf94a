// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! A single connected client: identity, liveness bookkeeping, and the
//! outbound slot the broadcaster writes into (§3, §4.6).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as PlMutex;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::security::SharedTokenBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Streaming,
    Closing,
    Closed,
}

/// One element overwrite mailbox for outbound frames (the "outbound slot"
/// in the glossary). Built on `tokio::sync::watch`, the same primitive as
/// [`crate::channel::TelemetryChannel`], because both need wait-free
/// producer writes and "only the latest value matters" semantics.
pub struct OutboundSlot {
    tx: watch::Sender<Option<String>>,
}

pub struct OutboundSlotReceiver {
    rx: watch::Receiver<Option<String>>,
}

impl OutboundSlot {
    pub fn new() -> (Self, OutboundSlotReceiver) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, OutboundSlotReceiver { rx })
    }

    pub fn overwrite(&self, frame: String) {
        self.tx.send_replace(Some(frame));
    }
}

impl OutboundSlotReceiver {
    pub async fn next_frame(&mut self) -> Option<String> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

/// Per-session bookkeeping owned exclusively by the connection manager's
/// session map. The rx/tx tasks only ever reach this data through the
/// handle the manager hands them at spawn time.
pub struct ClientSession {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub connected_at_ms: i64,
    last_rx_ms: AtomicI64,
    last_tx_ms: AtomicI64,
    pub token_bucket: SharedTokenBucket,
    outbound: OutboundSlot,
    close_signal: Arc<Notify>,
    close_reason: PlMutex<Option<String>>,
}

impl ClientSession {
    pub fn new(
        remote_addr: SocketAddr,
        connected_at_ms: i64,
        token_bucket: SharedTokenBucket,
    ) -> (Self, OutboundSlotReceiver) {
        let (outbound, receiver) = OutboundSlot::new();
        (
            Self {
                id: SessionId::new(),
                remote_addr,
                connected_at_ms,
                last_rx_ms: AtomicI64::new(connected_at_ms),
                last_tx_ms: AtomicI64::new(connected_at_ms),
                token_bucket,
                outbound,
                close_signal: Arc::new(Notify::new()),
                close_reason: PlMutex::new(None),
            },
            receiver,
        )
    }

    /// Handle other tasks can await to learn this session is being torn
    /// down, independent of whatever the rx loop itself is blocked on
    /// (e.g. an idle socket producing no frames at all).
    pub fn close_signal(&self) -> Arc<Notify> {
        self.close_signal.clone()
    }

    /// Request that the rx loop and tx task unwind. Idempotent: the first
    /// caller's `reason` wins and is what the WS close frame carries.
    pub fn request_close(&self, reason: &str) {
        let mut guard = self.close_reason.lock();
        if guard.is_none() {
            *guard = Some(reason.to_string());
        }
        drop(guard);
        self.close_signal.notify_waiters();
    }

    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    pub fn touch_rx(&self, now_ms: i64) {
        self.last_rx_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn touch_tx(&self, now_ms: i64) {
        self.last_tx_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_rx_ms(&self) -> i64 {
        self.last_rx_ms.load(Ordering::Relaxed)
    }

    pub fn last_tx_ms(&self) -> i64 {
        self.last_tx_ms.load(Ordering::Relaxed)
    }

    pub fn is_idle_past(&self, now_ms: i64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_rx_ms()) > timeout_ms as i64
    }

    pub fn send_frame(&self, frame: String) {
        self.outbound.overwrite(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn idle_past_timeout_detected() {
        let bucket = SharedTokenBucket::new(10, 10, Instant::now());
        let (session, _rx) = ClientSession::new(addr(), 0, bucket);
        session.touch_rx(0);
        assert!(!session.is_idle_past(5_000, 15_000));
        assert!(session.is_idle_past(20_000, 15_000));
    }

    #[tokio::test]
    async fn outbound_slot_overwrites_unread_frame() {
        let bucket = SharedTokenBucket::new(10, 10, Instant::now());
        let (session, mut receiver) = ClientSession::new(addr(), 0, bucket);
        session.send_frame("first".to_string());
        session.send_frame("second".to_string());
        let frame = receiver.next_frame().await.unwrap();
        assert_eq!(frame, "second");
    }

    #[tokio::test]
    async fn request_close_wakes_waiter_with_first_reason() {
        let bucket = SharedTokenBucket::new(10, 10, Instant::now());
        let (session, _rx) = ClientSession::new(addr(), 0, bucket);
        let signal = session.close_signal();
        let waiter = tokio::spawn(async move {
            signal.notified().await;
        });
        tokio::task::yield_now().await;

        session.request_close("idle_timeout");
        session.request_close("protocol_error");

        waiter.await.unwrap();
        assert_eq!(session.close_reason().as_deref(), Some("idle_timeout"));
    }
}
