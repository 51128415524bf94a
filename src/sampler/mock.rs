// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Deterministic, seedable sampler used by tests and `--mock` runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::HardwareSection;
use crate::error::NeonLinkError;
use crate::snapshot::{
    AdminLevel, CoreReading, CpuReading, GamingReading, GpuReading, GpuVendor, NetworkReading,
    RamReading, Snapshot, StorageReading, SCHEMA_VERSION,
};

pub struct MockSampler {
    rng: StdRng,
    core_count: u32,
}

impl MockSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            core_count: 8,
        }
    }

    fn jitter(&mut self, base: f32, spread: f32) -> f32 {
        base + self.rng.gen_range(-spread..spread)
    }
}

impl Default for MockSampler {
    fn default() -> Self {
        Self::new(0xC0FFEE)
    }
}

impl super::Sampler for MockSampler {
    fn sample(&mut self, hardware: &HardwareSection) -> Result<Snapshot, NeonLinkError> {
        let core_count = self.core_count;
        let cores = (0..core_count)
            .map(|id| CoreReading {
                id,
                usage_percent: self.jitter(35.0, 15.0).clamp(0.0, 100.0),
                temp_c: Some(self.jitter(55.0, 8.0)),
                clock_mhz: Some(self.jitter(3600.0, 200.0)),
            })
            .collect::<Vec<_>>();

        let cpu_usage = cores.iter().map(|c| c.usage_percent).sum::<f32>() / core_count as f32;

        let mut snapshot = Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp_ms: 0,
            cpu: CpuReading {
                name: "Mock CPU".to_string(),
                usage_percent: cpu_usage.clamp(0.0, 100.0),
                temp_c: self.jitter(55.0, 8.0),
                clock_mhz: self.jitter(3800.0, 150.0),
                power_w: Some(self.jitter(65.0, 15.0).max(0.0)),
                cores,
            },
            gpu: GpuReading {
                name: "Mock GPU".to_string(),
                vendor: GpuVendor::Nvidia,
                usage_percent: self.jitter(40.0, 20.0).clamp(0.0, 100.0),
                temp_c: self.jitter(60.0, 10.0),
                vram_used_gi_b: self.jitter(6.0, 1.5).max(0.0),
                vram_total_gi_b: 12.0,
                core_clock_mhz: self.jitter(1800.0, 100.0),
                memory_clock_mhz: Some(self.jitter(9500.0, 200.0)),
                power_w: Some(self.jitter(180.0, 40.0).max(0.0)),
                fan_rpm: Some(self.rng.gen_range(800..2200)),
            },
            ram: RamReading {
                used_gi_b: self.jitter(16.0, 4.0).max(0.0),
                total_gi_b: 32.0,
                speed_mhz: Some(6000),
            },
            storage: vec![StorageReading {
                name: "Mock NVMe".to_string(),
                temp_c: Some(self.jitter(42.0, 5.0)),
                health_percent: Some(98.0),
                smart: None,
            }],
            network: hardware.enable_network.then(|| NetworkReading {
                download_m_bps: self.jitter(50.0, 30.0).max(0.0),
                upload_m_bps: self.jitter(10.0, 5.0).max(0.0),
                ping_ms: self.jitter(18.0, 6.0).max(0.1),
                local_ip: Some("192.168.1.42".to_string()),
            }),
            gaming: Some(GamingReading {
                active: false,
                fps: None,
                fps1_low: None,
                frametime_ms: None,
                process_name: None,
            }),
            admin_level: AdminLevel::Full,
        };

        if !hardware.enable_gpu {
            snapshot.gpu.usage_percent = 0.0;
        }

        snapshot.clamp_invariants();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Sampler;

    #[test]
    fn produces_valid_invariants() {
        let mut sampler = MockSampler::new(1);
        let hardware = HardwareSection::default();
        for _ in 0..20 {
            let snap = sampler.sample(&hardware).unwrap();
            assert!(snap.ram.used_gi_b <= snap.ram.total_gi_b);
            assert!(snap.gpu.vram_used_gi_b <= snap.gpu.vram_total_gi_b);
            assert!((0.0..=100.0).contains(&snap.cpu.usage_percent));
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let hardware = HardwareSection::default();
        let mut a = MockSampler::new(42);
        let mut b = MockSampler::new(42);
        assert_eq!(
            a.sample(&hardware).unwrap().cpu.usage_percent,
            b.sample(&hardware).unwrap().cpu.usage_percent
        );
    }
}
