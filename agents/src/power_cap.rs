// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Power-cap agent: drives one package power-limit control toward a target wattage.

use std::collections::VecDeque;
use std::time::Instant;

use hwio::{HardwareIo, MsrDescriptionTable};
use runtime::{Agent, Result};

use crate::platform;

/// Bounded median filter over recent observed-power samples, decoupled from any hardware
/// access so it can be unit-tested directly against literal sample sequences.
pub struct ConvergenceFilter {
    capacity: usize,
    min_converged: usize,
    buffer: VecDeque<f64>,
}

impl ConvergenceFilter {
    pub fn new(capacity: usize, min_converged: usize) -> Self {
        ConvergenceFilter {
            capacity,
            min_converged,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
    }

    /// NaN until at least `min_converged` samples have been pushed.
    pub fn median(&self) -> f64 {
        if self.buffer.len() < self.min_converged {
            return f64::NAN;
        }
        let mut sorted: Vec<f64> = self.buffer.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    pub fn is_converged(&self, target: f64) -> bool {
        let median = self.median();
        !median.is_nan() && median <= target
    }
}

pub struct PowerGovernorAgent {
    period_seconds: f64,
    profile: String,
    metric_names: Vec<String>,
    hwio: HardwareIo,
    energy_slots: Vec<usize>,
    energy_scalar: f64,
    write_slot: usize,
    power_limit_scalar: f64,
    power_limit_shape: platform::FieldShape,
    min_avail_w: f64,
    max_avail_w: f64,
    tdp_w: f64,
    target_w: f64,
    filter: ConvergenceFilter,
    prev_energy_j: f64,
    prev_instant: Instant,
}

impl PowerGovernorAgent {
    pub fn new(
        period_seconds: f64,
        profile: String,
        params: &[f64],
        cpus: &[u32],
        mut hwio: HardwareIo,
        desc: &MsrDescriptionTable,
    ) -> Result<Self> {
        let energy_offset = platform::require_offset(desc, platform::PKG_ENERGY_STATUS, "power_governor")?;
        let energy_scalar = platform::field_scalar(desc, platform::PKG_ENERGY_STATUS, platform::ENERGY_FIELD);
        let energy_slots = cpus.iter().map(|&cpu| hwio.add_read(cpu, energy_offset)).collect();

        let limit_offset = platform::require_offset(desc, platform::PKG_POWER_LIMIT, "power_governor")?;
        let power_limit_scalar = platform::field_scalar(desc, platform::PKG_POWER_LIMIT, platform::POWER_LIMIT_FIELD);
        let power_limit_shape = platform::field_shape(desc, platform::PKG_POWER_LIMIT, platform::POWER_LIMIT_FIELD);
        let write_slot = hwio.add_write(cpus[0], limit_offset)?;

        let min_avail_w = platform::offset(desc, platform::PKG_POWER_INFO)
            .and_then(|_| desc.field(platform::PKG_POWER_INFO, platform::MIN_POWER_FIELD).ok())
            .map(|f| f.scalar)
            .unwrap_or(platform::DEFAULT_MIN_POWER_W);
        let max_avail_w = platform::offset(desc, platform::PKG_POWER_INFO)
            .and_then(|_| desc.field(platform::PKG_POWER_INFO, platform::MAX_POWER_FIELD).ok())
            .map(|f| f.scalar)
            .unwrap_or(platform::DEFAULT_MAX_POWER_W);
        let tdp_w = platform::offset(desc, platform::PKG_POWER_INFO)
            .and_then(|_| desc.field(platform::PKG_POWER_INFO, platform::THERMAL_SPEC_FIELD).ok())
            .map(|f| f.scalar)
            .unwrap_or(platform::DEFAULT_TDP_W);

        let requested = params.first().copied().unwrap_or(f64::NAN);
        let target_w = if requested.is_nan() { tdp_w } else { requested.clamp(min_avail_w, max_avail_w) };

        Ok(PowerGovernorAgent {
            period_seconds,
            profile,
            metric_names: vec![
                "package-power W".to_string(),
                "power-target W".to_string(),
                "converged".to_string(),
            ],
            hwio,
            energy_slots,
            energy_scalar,
            write_slot,
            power_limit_scalar,
            power_limit_shape,
            min_avail_w,
            max_avail_w,
            tdp_w,
            target_w,
            filter: ConvergenceFilter::new(16, 15),
            prev_energy_j: f64::NAN,
            prev_instant: Instant::now(),
        })
    }
}

impl Agent for PowerGovernorAgent {
    fn name(&self) -> &str {
        "power_governor"
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

        let energy_j: f64 = self
            .energy_slots
            .iter()
            .filter_map(|&slot| self.hwio.sample(slot).ok())
            .map(|raw| raw as f64 * self.energy_scalar)
            .sum();

        let power_w = if dt > 0.0 && !self.prev_energy_j.is_nan() {
            (energy_j - self.prev_energy_j) / dt
        } else {
            f64::NAN
        };
        self.prev_energy_j = energy_j;

        if !power_w.is_nan() {
            self.filter.push(power_w);
        }

        let limit_value = (self.target_w / self.power_limit_scalar).round() as u64;
        let (value, mask) = self.power_limit_shape.pack(limit_value);
        self.hwio.adjust(self.write_slot, value, mask)?;
        self.hwio.write_batch()?;

        let converged = if self.filter.is_converged(self.target_w) { 1.0 } else { 0.0 };

        let _ = (self.min_avail_w, self.max_avail_w, self.tdp_w);
        Ok(vec![power_w, self.target_w, converged])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_reports_nan_before_min_converged() {
        let mut filter = ConvergenceFilter::new(16, 15);
        for _ in 0..14 {
            filter.push(100.0);
        }
        assert!(filter.median().is_nan());
        filter.push(100.0);
        assert_eq!(filter.median(), 100.0);
    }

    #[test]
    fn filter_drops_oldest_beyond_capacity() {
        let mut filter = ConvergenceFilter::new(4, 1);
        filter.push(1.0);
        filter.push(2.0);
        filter.push(3.0);
        filter.push(4.0);
        filter.push(100.0);
        // 1.0 has been evicted; remaining {2,3,4,100} median is (3+4)/2.
        assert_eq!(filter.median(), 3.5);
    }

    #[test]
    fn is_converged_compares_median_against_target() {
        let mut filter = ConvergenceFilter::new(4, 2);
        filter.push(90.0);
        filter.push(95.0);
        assert!(filter.is_converged(100.0));
        assert!(!filter.is_converged(80.0));
    }
}
