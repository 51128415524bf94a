// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! `sysinfo`-backed sampler. Holds long-lived `sysinfo` handles and
//! re-queries them on every call, the same shape the teacher uses for its
//! long-lived DDS `Participant` handle in `DdsBridge`.
//!
//! GPU vendor SDKs, SMART attributes, and gaming-process detection are
//! genuinely out-of-scope hardware collaborators (§1): this sampler reports
//! `AdminLevel::Limited` and simply omits those fields rather than failing.

use std::time::Instant;

use sysinfo::{Disks, Networks, System};

use crate::config::HardwareSection;
use crate::error::NeonLinkError;
use crate::snapshot::{
    AdminLevel, CoreReading, CpuReading, GpuReading, GpuVendor, NetworkReading, RamReading,
    Snapshot, StorageReading, SCHEMA_VERSION,
};

pub struct HostSampler {
    system: System,
    disks: Disks,
    networks: Networks,
    last_network_sample: Option<(Instant, u64, u64)>,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_network_sample: None,
        }
    }

    fn sample_cpu(&mut self) -> CpuReading {
        self.system.refresh_cpu_usage();
        let cores: Vec<CoreReading> = self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(id, cpu)| CoreReading {
                id: id as u32,
                usage_percent: cpu.cpu_usage().clamp(0.0, 100.0),
                temp_c: None,
                clock_mhz: Some(cpu.frequency() as f32),
            })
            .collect();

        let overall = if cores.is_empty() {
            0.0
        } else {
            cores.iter().map(|c| c.usage_percent).sum::<f32>() / cores.len() as f32
        };
        let clock_mhz = cores
            .first()
            .and_then(|c| c.clock_mhz)
            .unwrap_or(0.0);

        CpuReading {
            name: self
                .system
                .cpus()
                .first()
                .map(|c| c.brand().to_string())
                .unwrap_or_else(|| "Unknown CPU".to_string()),
            usage_percent: overall,
            // sysinfo exposes no cross-platform CPU package temperature; a
            // real deployment would source this from a vendor probe. We
            // report 0.0 rather than a fabricated value and rely on
            // AdminLevel::Limited to signal the gap.
            temp_c: 0.0,
            clock_mhz,
            power_w: None,
            cores,
        }
    }

    fn sample_ram(&mut self) -> RamReading {
        self.system.refresh_memory();
        let bytes_to_gib = |b: u64| b as f32 / (1024.0 * 1024.0 * 1024.0);
        let mut reading = RamReading {
            used_gi_b: bytes_to_gib(self.system.used_memory()),
            total_gi_b: bytes_to_gib(self.system.total_memory()),
            speed_mhz: None,
        };
        reading.clamp_used();
        reading
    }

    fn sample_storage(&mut self) -> Vec<StorageReading> {
        self.disks.refresh();
        self.disks
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let available = disk.available_space();
                let health_percent = if total > 0 {
                    Some((available as f32 / total as f32 * 100.0).clamp(0.0, 100.0))
                } else {
                    None
                };
                StorageReading {
                    name: disk.name().to_string_lossy().to_string(),
                    temp_c: None,
                    health_percent,
                    smart: None,
                }
            })
            .collect()
    }

    fn sample_network(&mut self) -> Option<NetworkReading> {
        self.networks.refresh();
        let now = Instant::now();
        let (received, transmitted): (u64, u64) = self
            .networks
            .iter()
            .fold((0, 0), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });

        let reading = match self.last_network_sample {
            Some((prev_instant, prev_rx, prev_tx)) => {
                let elapsed = now.saturating_duration_since(prev_instant).as_secs_f64().max(0.001);
                let download_mbps =
                    (received.saturating_sub(prev_rx) as f64 / elapsed / (1024.0 * 1024.0)) as f32;
                let upload_mbps =
                    (transmitted.saturating_sub(prev_tx) as f64 / elapsed / (1024.0 * 1024.0)) as f32;
                Some(NetworkReading {
                    download_m_bps: download_mbps.max(0.0),
                    upload_m_bps: upload_mbps.max(0.0),
                    // sysinfo does not measure latency; a real deployment
                    // pings a configured host out-of-band.
                    ping_ms: 0.0,
                    local_ip: None,
                })
            }
            None => None,
        };
        self.last_network_sample = Some((now, received, transmitted));
        reading
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Sampler for HostSampler {
    fn sample(&mut self, hardware: &HardwareSection) -> Result<Snapshot, NeonLinkError> {
        let cpu = if hardware.enable_cpu {
            self.sample_cpu()
        } else {
            CpuReading {
                name: "disabled".to_string(),
                usage_percent: 0.0,
                temp_c: 0.0,
                clock_mhz: 0.0,
                power_w: None,
                cores: Vec::new(),
            }
        };

        let ram = if hardware.enable_ram {
            self.sample_ram()
        } else {
            RamReading {
                used_gi_b: 0.0,
                total_gi_b: 0.0,
                speed_mhz: None,
            }
        };

        let storage = if hardware.enable_storage {
            self.sample_storage()
        } else {
            Vec::new()
        };

        let network = if hardware.enable_network {
            self.sample_network()
        } else {
            None
        };

        // No portable, dependency-free GPU probe ships in this repo; a
        // vendor NVML/ADL backend is the out-of-scope collaborator named in
        // §1. We still report the field shape the wire schema requires.
        let gpu = GpuReading {
            name: "unavailable".to_string(),
            vendor: GpuVendor::Unknown,
            usage_percent: 0.0,
            temp_c: 0.0,
            vram_used_gi_b: 0.0,
            vram_total_gi_b: 0.0,
            core_clock_mhz: 0.0,
            memory_clock_mhz: None,
            power_w: None,
            fan_rpm: None,
        };

        let mut snapshot = Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp_ms: 0,
            cpu,
            gpu,
            ram,
            storage,
            network,
            gaming: None,
            admin_level: AdminLevel::Limited,
        };
        snapshot.clamp_invariants();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Sampler;

    #[test]
    fn sample_does_not_panic_and_respects_invariants() {
        let mut sampler = HostSampler::new();
        let hardware = HardwareSection::default();
        let snap = sampler.sample(&hardware).unwrap();
        assert!(snap.ram.used_gi_b <= snap.ram.total_gi_b);
        assert_eq!(snap.admin_level, AdminLevel::Limited);
    }

    #[test]
    fn disabled_hardware_sections_report_empty() {
        let mut sampler = HostSampler::new();
        let mut hardware = HardwareSection::default();
        hardware.enable_cpu = false;
        hardware.enable_storage = false;
        let snap = sampler.sample(&hardware).unwrap();
        assert!(snap.cpu.cores.is_empty());
        assert!(snap.storage.is_empty());
    }
}
