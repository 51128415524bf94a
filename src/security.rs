// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Admission control, the per-session token bucket, and the command
//! whitelist check (§4.5).

use std::net::IpAddr;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Config;
use crate::snapshot::AdminLevel;

/// Decide whether a peer address is allowed to reach the handshake at all.
/// Applied before any frame exchange, per the admission sequence in the
/// design doc.
pub fn is_addr_admitted(addr: IpAddr, allow_external_ip: bool) -> bool {
    if allow_external_ip {
        return true;
    }
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_private() || v4.is_loopback())
        }
    }
}

/// Linear-refill token bucket, one per session. Math: `tokens = min(cap,
/// tokens + elapsedMinutes * refillPerMinute)` applied before a command
/// decrements it.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_minute: f64,
    tokens: f64,
    updated_at: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_minute: u32, now: Instant) -> Self {
        Self {
            capacity: capacity.max(1) as f64,
            refill_per_minute: refill_per_minute as f64,
            tokens: capacity.max(1) as f64,
            updated_at: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_minutes = now.saturating_duration_since(self.updated_at).as_secs_f64() / 60.0;
        self.tokens = (self.tokens + elapsed_minutes * self.refill_per_minute).min(self.capacity);
        self.updated_at = now;
    }

    /// Refill, then attempt to consume one token. Returns `false` (and does
    /// not mutate available tokens further) when fewer than one token is
    /// available, per invariant 4.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Thread-safe wrapper so a session can share its bucket between the rx
/// task (which consumes tokens) and diagnostics (which may report them).
#[derive(Debug)]
pub struct SharedTokenBucket(Mutex<TokenBucket>);

impl SharedTokenBucket {
    pub fn new(capacity: u32, refill_per_minute: u32, now: Instant) -> Self {
        Self(Mutex::new(TokenBucket::new(capacity, refill_per_minute, now)))
    }

    pub fn try_consume(&self, now: Instant) -> bool {
        self.0.lock().try_consume(now)
    }
}

/// Whitelist + admin-level + dangerous-commands-enabled check, run before
/// handler lookup.
pub fn is_command_allowed(
    command: &str,
    config: &Config,
    admin_level: AdminLevel,
) -> Result<(), &'static str> {
    if !config.security.allowed_commands.contains(command) {
        return Err("unknown_command");
    }
    if crate::config::DANGEROUS_COMMANDS.contains(&command) {
        let admin_ok = matches!(admin_level, AdminLevel::Full);
        if !admin_ok || !config.security.dangerous_commands_enabled {
            return Err("forbidden");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn loopback_and_private_are_admitted() {
        assert!(is_addr_admitted("127.0.0.1".parse().unwrap(), false));
        assert!(is_addr_admitted("192.168.1.5".parse().unwrap(), false));
        assert!(is_addr_admitted("10.0.0.1".parse().unwrap(), false));
    }

    #[test]
    fn public_ip_rejected_unless_allowed() {
        let public: IpAddr = "8.8.8.8".parse().unwrap();
        assert!(!is_addr_admitted(public, false));
        assert!(is_addr_admitted(public, true));
    }

    #[test]
    fn token_bucket_refills_linearly_and_blocks_below_one() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(5, 60, t0);
        for _ in 0..5 {
            assert!(bucket.try_consume(t0));
        }
        assert!(!bucket.try_consume(t0));

        let t1 = t0 + Duration::from_secs(30);
        assert!(bucket.try_consume(t1));
        assert!(!bucket.try_consume(t1));
    }

    #[test]
    fn token_bucket_caps_at_capacity() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(5, 600, t0);
        bucket.try_consume(t0);
        let t1 = t0 + Duration::from_secs(120);
        bucket.refill(t1);
        assert!(bucket.tokens() <= 5.0);
    }

    #[test]
    fn dangerous_command_requires_full_admin_and_flag() {
        let mut cfg = Config::default();
        cfg.security.dangerous_commands_enabled = false;
        assert_eq!(
            is_command_allowed("rgb_effect", &cfg, AdminLevel::Full),
            Err("forbidden")
        );

        cfg.security.dangerous_commands_enabled = true;
        assert_eq!(
            is_command_allowed("rgb_effect", &cfg, AdminLevel::Limited),
            Err("forbidden")
        );
        assert_eq!(is_command_allowed("rgb_effect", &cfg, AdminLevel::Full), Ok(()));
    }

    #[test]
    fn unknown_command_rejected() {
        let cfg = Config::default();
        assert_eq!(
            is_command_allowed("delete_everything", &cfg, AdminLevel::Full),
            Err("unknown_command")
        );
    }
}
