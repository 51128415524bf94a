// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Error taxonomy for the NeonLink telemetry core.

use thiserror::Error;

/// Top-level error kind, matching the policy in the design doc: config/bind
/// errors are fatal at startup, everything else is local to a tick, a
/// session, or a single command.
#[derive(Debug, Error)]
pub enum NeonLinkError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to bind listener: {0}")]
    BindFailed(#[source] std::io::Error),

    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("rate limited")]
    RateLimited,

    #[error("forbidden")]
    Forbidden,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("timeout")]
    Timeout,

    #[error("server at capacity")]
    Capacity,

    #[error("internal error: {0}")]
    Internal(String),
}

impl NeonLinkError {
    /// Map to the process exit codes from the external-interfaces section.
    pub fn exit_code(&self) -> i32 {
        match self {
            NeonLinkError::ConfigInvalid(_) => 2,
            NeonLinkError::BindFailed(_) => 3,
            _ => 1,
        }
    }

    /// The stable `error` string surfaced on a `CommandResponse`.
    pub fn as_wire_code(&self) -> &'static str {
        match self {
            NeonLinkError::RateLimited => "rate_limited",
            NeonLinkError::Forbidden => "forbidden",
            NeonLinkError::UnknownCommand(_) => "unknown_command",
            NeonLinkError::Timeout => "timeout",
            NeonLinkError::ProtocolError(_) => "protocol_error",
            NeonLinkError::Capacity => "capacity",
            NeonLinkError::SensorUnavailable(_) => "sensor_unavailable",
            NeonLinkError::ConfigInvalid(_) => "config_invalid",
            NeonLinkError::BindFailed(_) => "bind_failed",
            NeonLinkError::Internal(_) => "internal",
        }
    }
}
