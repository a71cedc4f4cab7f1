// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Monitor agent: read-only telemetry, no actuation.

use std::time::Instant;

use hwio::{HardwareIo, MsrDescriptionTable};
use runtime::{Agent, Result};
use tracing::debug;

use crate::platform;

/// Ordered per the design's `{cpu, gpu, dram} x {energy, power}` plus `{cpu, gpu} x {freq Hz,
/// freq %}`. GPU entries stay at the `NaN` sentinel for the life of the agent: this build has
/// no GPU telemetry provider wired in (an out-of-scope pluggable signal provider per the
/// design), and the design is explicit that unavailable metrics are NaN, not skipped.
pub const METRIC_NAMES: [&str; 10] = [
    "cpu-energy J",
    "gpu-energy J",
    "dram-energy J",
    "cpu-power W",
    "gpu-power W",
    "dram-power W",
    "cpu-freq Hz",
    "cpu-freq %",
    "gpu-freq Hz",
    "gpu-freq %",
];

struct EnergyChannel {
    slots: Vec<usize>,
    scalar: f64,
}

pub struct MonitorAgent {
    period_seconds: f64,
    profile: String,
    metric_names: Vec<String>,
    hwio: HardwareIo,
    cpu_energy: Option<EnergyChannel>,
    dram_energy: Option<EnergyChannel>,
    freq_channel: Option<(Vec<usize>, f64)>,
    prev_cpu_energy_j: f64,
    prev_dram_energy_j: f64,
    prev_instant: Instant,
}

impl MonitorAgent {
    pub fn new(
        period_seconds: f64,
        profile: String,
        cpus: &[u32],
        mut hwio: HardwareIo,
        desc: &MsrDescriptionTable,
    ) -> Result<Self> {
        let cpu_energy = Self::open_energy_channel(&mut hwio, cpus, platform::PKG_ENERGY_STATUS, desc);
        let dram_energy = Self::open_energy_channel(&mut hwio, cpus, platform::DRAM_ENERGY_STATUS, desc);
        let freq_channel = Self::open_freq_channel(&mut hwio, cpus, desc);

        if cpu_energy.is_none() {
            debug!("monitor agent: no package energy MSR in description table, cpu-energy/power will read NaN");
        }

        Ok(MonitorAgent {
            period_seconds,
            profile,
            metric_names: METRIC_NAMES.iter().map(ToString::to_string).collect(),
            hwio,
            cpu_energy,
            dram_energy,
            freq_channel,
            prev_cpu_energy_j: f64::NAN,
            prev_dram_energy_j: f64::NAN,
            prev_instant: Instant::now(),
        })
    }

    fn open_energy_channel(
        hwio: &mut HardwareIo,
        cpus: &[u32],
        msr_name: &str,
        desc: &MsrDescriptionTable,
    ) -> Option<EnergyChannel> {
        let offset = platform::offset(desc, msr_name)?;
        let scalar = platform::field_scalar(desc, msr_name, platform::ENERGY_FIELD);
        let slots = cpus.iter().map(|&cpu| hwio.add_read(cpu, offset)).collect();
        Some(EnergyChannel { slots, scalar })
    }

    fn open_freq_channel(
        hwio: &mut HardwareIo,
        cpus: &[u32],
        desc: &MsrDescriptionTable,
    ) -> Option<(Vec<usize>, f64)> {
        let offset = platform::offset(desc, platform::PERF_STATUS)?;
        let scalar = platform::field_scalar(desc, platform::PERF_STATUS, platform::FREQ_FIELD);
        let slots = cpus.iter().map(|&cpu| hwio.add_read(cpu, offset)).collect();
        Some((slots, scalar))
    }

    fn sum_energy(hwio: &HardwareIo, channel: &Option<EnergyChannel>) -> f64 {
        match channel {
            None => f64::NAN,
            Some(ch) => ch
                .slots
                .iter()
                .filter_map(|&slot| hwio.sample(slot).ok())
                .map(|raw| raw as f64 * ch.scalar)
                .sum(),
        }
    }
}

impl Agent for MonitorAgent {
    fn name(&self) -> &str {
        "monitor"
    }

    fn period(&self) -> f64 {
        self.period_seconds
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    fn update(&mut self) -> Result<Vec<f64>> {
        self.hwio.read_batch()?;

        let now = Instant::now();
        let dt = (now - self.prev_instant).as_secs_f64();
        self.prev_instant = now;

        let cpu_energy_j = Self::sum_energy(&self.hwio, &self.cpu_energy);
        let dram_energy_j = Self::sum_energy(&self.hwio, &self.dram_energy);

        let cpu_power_w = if dt > 0.0 && !self.prev_cpu_energy_j.is_nan() && !cpu_energy_j.is_nan() {
            (cpu_energy_j - self.prev_cpu_energy_j) / dt
        } else {
            f64::NAN
        };
        let dram_power_w = if dt > 0.0 && !self.prev_dram_energy_j.is_nan() && !dram_energy_j.is_nan() {
            (dram_energy_j - self.prev_dram_energy_j) / dt
        } else {
            f64::NAN
        };
        self.prev_cpu_energy_j = cpu_energy_j;
        self.prev_dram_energy_j = dram_energy_j;

        let cpu_freq_hz = match &self.freq_channel {
            None => f64::NAN,
            Some((slots, scalar)) => {
                let values: Vec<f64> = slots
                    .iter()
                    .filter_map(|&slot| self.hwio.sample(slot).ok())
                    .map(|raw| raw as f64 * scalar)
                    .collect();
                if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
        };
        let cpu_freq_pct = if cpu_freq_hz.is_nan() {
            f64::NAN
        } else {
            100.0 * cpu_freq_hz / platform::DEFAULT_STICKER_HZ
        };

        Ok(vec![
            cpu_energy_j,
            f64::NAN,
            dram_energy_j,
            cpu_power_w,
            f64::NAN,
            dram_power_w,
            cpu_freq_hz,
            cpu_freq_pct,
            f64::NAN,
            f64::NAN,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_description_entries_read_as_nan() {
        let desc: MsrDescriptionTable = serde_json::from_str("{}").unwrap();
        let hwio = HardwareIo::fake();
        let mut agent = MonitorAgent::new(1.0, String::new(), &[0, 1], hwio, &desc).unwrap();
        let sample = agent.update().unwrap();
        assert_eq!(sample.len(), METRIC_NAMES.len());
        assert!(sample[0].is_nan());
        assert!(sample[1].is_nan(), "gpu-energy is always NaN: no GPU provider wired in");
    }
}
