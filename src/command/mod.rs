// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Command protocol types and the dispatcher (§4.4).
//!
//! A command frame is deserialized into [`CommandRequest`], run through
//! whitelist/admin/rate-limit checks in [`crate::security`], then handed to
//! the matching entry in [`handlers`]. The dispatcher itself never touches
//! the socket; the session owns framing.

pub mod handlers;
pub mod scripts;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Cache;
use crate::channel::TelemetryChannel;
use crate::clock::Clock;
use crate::config::SharedConfig;
use crate::error::NeonLinkError;
use crate::snapshot::AdminLevel;
use scripts::ScriptRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp_ms: i64,
}

impl CommandResponse {
    pub fn ok(command: &str, id: Option<String>, result: Value, now_ms: i64) -> Self {
        Self {
            success: true,
            command: command.to_string(),
            id,
            result: Some(result),
            error: None,
            timestamp_ms: now_ms,
        }
    }

    pub fn err(command: &str, id: Option<String>, error: &str, now_ms: i64) -> Self {
        Self {
            success: false,
            command: command.to_string(),
            id,
            result: None,
            error: Some(error.to_string()),
            timestamp_ms: now_ms,
        }
    }
}

/// Per-session last status cache key, scoped to avoid cross-session bleed
/// when `get_status` is memoized with a short TTL.
const STATUS_CACHE_TTL: Duration = Duration::from_millis(500);

/// Handles the non-socket half of a command: validation, cache coordination,
/// and routing to a handler. Shared across all sessions; holds no
/// per-session state beyond what each call receives explicitly.
pub struct CommandDispatcher {
    config: SharedConfig,
    status_cache: Cache<Value>,
    scripts: ScriptRegistry,
    started_at_ms: i64,
}

/// Mutable handles a handler may need beyond its own params, gathered here
/// rather than threaded individually through every handler signature.
///
/// Deliberately does not expose the `Sampler` itself: the sampler contract
/// (§4.1) restricts calls to the one fixed sampling-loop task, so a handler
/// that wants hardware data reads the latest published snapshot off
/// `telemetry` instead of triggering a second, uncoordinated probe.
pub struct DispatchContext<'a> {
    pub admin_level: AdminLevel,
    pub telemetry: &'a TelemetryChannel,
    pub clock: &'a dyn Clock,
}

impl CommandDispatcher {
    pub fn new(config: SharedConfig, scripts: ScriptRegistry, clock: &dyn Clock) -> Self {
        Self {
            config,
            status_cache: Cache::new(),
            scripts,
            started_at_ms: clock.now_ms(),
        }
    }

    /// Run whitelist/admin checks, then dispatch. The caller is responsible
    /// for the rate-limit check (invariant 4 requires it happen before the
    /// handler is even considered, which the session's rx loop enforces).
    pub async fn dispatch(&self, request: CommandRequest, ctx: DispatchContext<'_>) -> CommandResponse {
        let now_ms = ctx.clock.now_ms();
        let config = self.config.load();

        if let Err(code) = crate::security::is_command_allowed(&request.command, &config, ctx.admin_level) {
            return CommandResponse::err(&request.command, request.id, code, now_ms);
        }

        let result = match request.command.as_str() {
            "ping" => handlers::ping(),
            "get_status" => {
                handlers::get_status(&self.status_cache, STATUS_CACHE_TTL, ctx.telemetry, ctx.clock, self.started_at_ms)
                    .await
            }
            "get_config" => handlers::get_config(&config),
            "set_polling_interval" => handlers::set_polling_interval(&request.params, &self.config),
            "set_config" => handlers::set_config(&request.params, &self.config),
            "get_scripts" => handlers::get_scripts(&self.scripts),
            "run_script" => handlers::run_script(&request.params, &self.scripts).await,
            "stop_script" => handlers::stop_script(&request.params, &self.scripts).await,
            "rgb_effect" => handlers::rgb_effect(&request.params),
            "set_fan_speed" => handlers::set_fan_speed(&request.params),
            other => Err(NeonLinkError::UnknownCommand(other.to_string())),
        };

        match result {
            Ok(value) => CommandResponse::ok(&request.command, request.id, value, now_ms),
            Err(err) => CommandResponse::err(&request.command, request.id, err.as_wire_code(), now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::Config;

    fn dispatcher() -> CommandDispatcher {
        let clock = MockClock::new(1_000);
        CommandDispatcher::new(SharedConfig::new(Config::default()), ScriptRegistry::new(vec![]), &clock)
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let dispatcher = dispatcher();
        let clock = MockClock::new(1_000);
        let telemetry = TelemetryChannel::new();
        let response = dispatcher
            .dispatch(
                CommandRequest {
                    id: Some("a".into()),
                    command: "ping".into(),
                    params: Value::Null,
                },
                DispatchContext {
                    admin_level: AdminLevel::Full,
                    telemetry: &telemetry,
                    clock: &clock,
                },
            )
            .await;
        assert!(response.success);
        assert_eq!(response.result.unwrap(), Value::String("pong".into()));
    }

    #[tokio::test]
    async fn dangerous_command_forbidden_by_default() {
        let dispatcher = dispatcher();
        let clock = MockClock::new(1_000);
        let telemetry = TelemetryChannel::new();
        let response = dispatcher
            .dispatch(
                CommandRequest {
                    id: None,
                    command: "rgb_effect".into(),
                    params: serde_json::json!({"effect": "static", "color": "#FF0000"}),
                },
                DispatchContext {
                    admin_level: AdminLevel::Full,
                    telemetry: &telemetry,
                    clock: &clock,
                },
            )
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("forbidden"));
    }

    #[tokio::test]
    async fn unknown_command_rejected_before_handler() {
        let dispatcher = dispatcher();
        let clock = MockClock::new(1_000);
        let telemetry = TelemetryChannel::new();
        let response = dispatcher
            .dispatch(
                CommandRequest {
                    id: None,
                    command: "launch_missiles".into(),
                    params: Value::Null,
                },
                DispatchContext {
                    admin_level: AdminLevel::Full,
                    telemetry: &telemetry,
                    clock: &clock,
                },
            )
            .await;
        assert_eq!(response.error.as_deref(), Some("unknown_command"));
    }
}
