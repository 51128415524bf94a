// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! The `Sampler` capability (§4.1): converts raw hardware readings into an
//! immutable [`Snapshot`]. Concrete hardware drivers are an out-of-scope
//! collaborator; this module ships a `sysinfo`-backed host implementation
//! plus a deterministic mock for tests.

pub mod host;
pub mod mock;

use crate::config::HardwareSection;
use crate::error::NeonLinkError;
use crate::snapshot::Snapshot;

pub use host::HostSampler;
pub use mock::MockSampler;

/// Returns a `Snapshot` for the current instant, or fails with
/// `SensorUnavailable` only when sampling cannot produce anything at all.
/// Must only ever be called from the sampling task (see §4.1 and §5); a
/// per-device probe failure is represented by an absent field on the
/// reading, never by a whole-sample failure.
pub trait Sampler: Send {
    fn sample(&mut self, hardware: &HardwareSection) -> Result<Snapshot, NeonLinkError>;
}
