// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! The telemetry data model (§3 of the design doc). Every reading is
//! immutable and value-typed; missing sensors are represented by omission
//! (`Option::None`, which serde drops from the wire frame) rather than by
//! zero-filling.

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdminLevel {
    Full,
    Limited,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreReading {
    pub id: u32,
    pub usage_percent: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_mhz: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuReading {
    pub name: String,
    pub usage_percent: f32,
    pub temp_c: f32,
    pub clock_mhz: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f32>,
    pub cores: Vec<CoreReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    #[serde(rename = "NVIDIA")]
    Nvidia,
    #[serde(rename = "AMD")]
    Amd,
    Intel,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuReading {
    pub name: String,
    pub vendor: GpuVendor,
    pub usage_percent: f32,
    pub temp_c: f32,
    pub vram_used_gi_b: f32,
    pub vram_total_gi_b: f32,
    pub core_clock_mhz: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_clock_mhz: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_rpm: Option<u32>,
}

impl GpuReading {
    /// Clamp `vramUsed` to `vramTotal` and emit a structured warning,
    /// matching the sampler edge case in the design doc ("totals that
    /// become inconsistent are clamped").
    pub fn clamp_vram(&mut self) {
        if self.vram_used_gi_b > self.vram_total_gi_b {
            tracing::warn!(
                used = self.vram_used_gi_b,
                total = self.vram_total_gi_b,
                "clamping inconsistent vram reading"
            );
            self.vram_used_gi_b = self.vram_total_gi_b;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RamReading {
    pub used_gi_b: f32,
    pub total_gi_b: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mhz: Option<u32>,
}

impl RamReading {
    pub fn clamp_used(&mut self) {
        if self.used_gi_b > self.total_gi_b {
            tracing::warn!(
                used = self.used_gi_b,
                total = self.total_gi_b,
                "clamping inconsistent ram reading"
            );
            self.used_gi_b = self.total_gi_b;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_on_hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reallocated_sectors: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReading {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart: Option<SmartInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReading {
    pub download_m_bps: f32,
    pub upload_m_bps: f32,
    pub ping_ms: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamingReading {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps1_low: Option<f32>,
    /// Frametime in milliseconds, always a float per the resolved open
    /// question on integer-vs-float frametime encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frametime_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: String,
    pub timestamp_ms: i64,
    pub cpu: CpuReading,
    pub gpu: GpuReading,
    pub ram: RamReading,
    pub storage: Vec<StorageReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaming: Option<GamingReading>,
    pub admin_level: AdminLevel,
}

impl Snapshot {
    /// Clamp every `used <= total` invariant and warn on violations. Called
    /// once by every `Sampler` implementation before the snapshot is handed
    /// to the channel (invariant 2 in the testable-properties section).
    pub fn clamp_invariants(&mut self) {
        self.ram.clamp_used();
        self.gpu.clamp_vram();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp_ms: 1,
            cpu: CpuReading {
                name: "Test CPU".into(),
                usage_percent: 10.0,
                temp_c: 40.0,
                clock_mhz: 3200.0,
                power_w: None,
                cores: vec![],
            },
            gpu: GpuReading {
                name: "Test GPU".into(),
                vendor: GpuVendor::Unknown,
                usage_percent: 5.0,
                temp_c: 35.0,
                vram_used_gi_b: 20.0,
                vram_total_gi_b: 8.0,
                core_clock_mhz: 1000.0,
                memory_clock_mhz: None,
                power_w: None,
                fan_rpm: None,
            },
            ram: RamReading {
                used_gi_b: 64.0,
                total_gi_b: 32.0,
                speed_mhz: None,
            },
            storage: vec![],
            network: None,
            gaming: None,
            admin_level: AdminLevel::Full,
        }
    }

    #[test]
    fn clamp_invariants_enforces_used_le_total() {
        let mut snap = sample_snapshot();
        snap.clamp_invariants();
        assert!(snap.ram.used_gi_b <= snap.ram.total_gi_b);
        assert!(snap.gpu.vram_used_gi_b <= snap.gpu.vram_total_gi_b);
    }

    #[test]
    fn round_trip_json() {
        let mut snap = sample_snapshot();
        snap.clamp_invariants();
        let json = serde_json::to_string(&snap).unwrap();
        let decoded: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, decoded);
    }

    #[test]
    fn omits_absent_fields() {
        let snap = sample_snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("network").is_none());
        assert!(json.get("gaming").is_none());
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
    }
}
