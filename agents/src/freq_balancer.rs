// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frequency-balancer agent: rebalances per-core frequency controls at epoch boundaries via
//! [`balancer::balance`], with fast per-tick adjustments for network-hinted cores in between.

use hwio::{HardwareIo, MsrDescriptionTable, Topology};
use runtime::{Agent, Result};

use balancer::{balance, BalancerConfig};
use freqmodel::{FrequencyLimitModel, SstTf, Trl};

use crate::platform;
use crate::region::RegionProvider;
use crate::sst_config;

/// At least this many ticks must elapse since the previous epoch boundary before a new one
/// can be declared.
const MINIMUM_WAIT_PERIODS: u32 = 4;
/// At least this many region-hash-distinguishable epochs must have been counted.
const MINIMUM_EPOCHS: u32 = 2;
/// Consecutive network-hinted ticks before a core is driven to the low-priority cutoff.
const NETWORK_HINT_MIN_SAMPLE_LENGTH: u32 = 3;
/// Consecutive non-network ticks before a core is promoted to `max_hz`, when no core in its
/// package is currently both high-priority and off cutoff.
const NON_NETWORK_HINT_MIN_SAMPLE_LENGTH: u32 = 1;

struct CoreState {
    epoch_time_seconds: f64,
    control_hz: f64,
    achieved_hz: f64,
    max_hz: f64,
    last_hash: f64,
    last_clos: u64,
    consecutive_network_ticks: u32,
    consecutive_non_network_ticks: u32,
    freq_read_slot: usize,
    freq_ctl_write_slot: usize,
    clos_write_slot: Option<usize>,
}

pub struct FrequencyBalancerAgent {
    period_seconds: f64,
    profile: String,
    metric_names: Vec<String>,
    hwio: HardwareIo,
    topology: Topology,
    region_provider: Box<dyn RegionProvider>,
    model: Box<dyn FrequencyLimitModel>,
    use_sst_tf: bool,
    config: BalancerConfig,
    freq_scalar: f64,
    freq_ctl_shape: platform::FieldShape,
    clos_shape: platform::FieldShape,
    cores: Vec<CoreState>,
    hp_cutoff_per_package: Vec<f64>,
    ticks_since_boundary: u32,
    epochs_counted: u32,
}

impl FrequencyBalancerAgent {
    pub fn new(
        period_seconds: f64,
        profile: String,
        params: &[f64],
        cpus: &[u32],
        topology: Topology,
        mut hwio: HardwareIo,
        desc: &MsrDescriptionTable,
        region_provider: Box<dyn RegionProvider>,
    ) -> Result<Self> {
        let use_freq_limits = params.get(1).copied().unwrap_or(1.0) != 0.0;
        let use_sst_tf = use_freq_limits && params.get(2).copied().unwrap_or(0.0) != 0.0;

        let perf_status_offset = platform::require_offset(desc, platform::PERF_STATUS, "frequency_balancer")?;
        let perf_ctl_offset = platform::require_offset(desc, platform::PERF_CTL, "frequency_balancer")?;
        let freq_scalar = platform::field_scalar(desc, platform::PERF_STATUS, platform::FREQ_FIELD);
        let freq_ctl_shape = platform::field_shape(desc, platform::PERF_CTL, platform::FREQ_FIELD);
        let clos_offset = platform::offset(desc, platform::PQR_ASSOC);
        let clos_shape = platform::field_shape(desc, platform::PQR_ASSOC, platform::CLOS_FIELD);

        let sticker_hz = platform::DEFAULT_STICKER_HZ;
        let model: Box<dyn FrequencyLimitModel> = if use_sst_tf {
            let tables = sst_config::load_or_fallback(&profile, topology.num_package, sticker_hz);
            Box::new(SstTf::new(
                freqmodel::CoreTopology::new(topology.package_of_core.clone()),
                tables,
            ))
        } else {
            Box::new(Trl::new(
                freqmodel::CoreTopology::new(topology.package_of_core.clone()),
                sticker_hz,
            ))
        };

        let mut cores = Vec::with_capacity(cpus.len());
        for &cpu in cpus {
            let freq_read_slot = hwio.add_read(cpu, perf_status_offset);
            let freq_ctl_write_slot = hwio.add_write(cpu, perf_ctl_offset)?;
            let clos_write_slot = match clos_offset {
                Some(offset) if use_sst_tf => Some(hwio.add_write(cpu, offset)?),
                _ => None,
            };
            cores.push(CoreState {
                epoch_time_seconds: 0.0,
                control_hz: platform::DEFAULT_MAX_HZ,
                achieved_hz: platform::DEFAULT_MAX_HZ,
                max_hz: platform::DEFAULT_MAX_HZ,
                last_hash: f64::NAN,
                last_clos: platform::CLOS_HIGH_PRIORITY,
                consecutive_network_ticks: 0,
                consecutive_non_network_ticks: 0,
                freq_read_slot,
                freq_ctl_write_slot,
                clos_write_slot,
            });
        }

        Ok(FrequencyBalancerAgent {
            period_seconds,
            profile,
            metric_names: vec!["core-freq Hz".to_string()],
            hwio,
            hp_cutoff_per_package: vec![f64::NEG_INFINITY; topology.num_package],
            topology,
            region_provider,
            model,
            use_sst_tf,
            config: BalancerConfig {
                uncertainty_window_seconds: 1e-3,
                min_hz: platform::DEFAULT_MIN_HZ,
                max_hz: platform::DEFAULT_MAX_HZ,
            },
            freq_scalar,
            freq_ctl_shape,
            clos_shape,
            cores,
            ticks_since_boundary: 0,
            epochs_counted: 0,
        })
    }

    /// Counts, per package, cores currently classed high-priority: CLOS `<= MEDIUM_HIGH`
    /// when SST-CP class-of-service is in play, or simply unthrottled (control above the
    /// package's low-priority cutoff) when it isn't.
    fn hp_core_count_per_package(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.topology.num_package];
        for (core, &package) in self.topology.package_of_core.iter().enumerate() {
            let is_hp = if self.use_sst_tf {
                self.cores[core].last_clos <= platform::CLOS_MEDIUM_HIGH
            } else {
                self.cores[core].control_hz > self.hp_cutoff_per_package[package]
            };
            if is_hp {
                counts[package] += 1;
            }
        }
        counts
    }

    fn run_epoch_boundary(&mut self, dt: f64) {
        let previous_time: Vec<f64> = self.cores.iter().map(|c| c.epoch_time_seconds).collect();
        let previous_control: Vec<f64> = self.cores.iter().map(|c| c.control_hz).collect();
        let previous_achieved: Vec<f64> = self.cores.iter().map(|c| c.achieved_hz).collect();
        let previous_max: Vec<f64> = self.cores.iter().map(|c| c.max_hz).collect();
        let ignore = vec![false; self.cores.len()];
        let hp_counts = self.hp_core_count_per_package();

        let (output, outcomes) = balance(
            &self.topology.package_of_core,
            &previous_time,
            &previous_control,
            &previous_achieved,
            &previous_max,
            &ignore,
            &hp_counts,
            self.model.as_mut(),
            &self.config,
        );

        for (core, &hz) in output.iter().enumerate() {
            self.cores[core].control_hz = hz;
        }
        for (package, outcome) in outcomes.iter().enumerate() {
            self.hp_cutoff_per_package[package] = outcome.cutoff_hz;
        }
        for core in &mut self.cores {
            core.epoch_time_seconds = 0.0;
        }
        let _ = dt;
    }

    fn fast_adjust(&mut self) {
        let mut package_has_hp_not_waiting = vec![false; self.topology.num_package];
        for (core, &package) in self.topology.package_of_core.iter().enumerate() {
            let cutoff = self.hp_cutoff_per_package[package];
            if self.cores[core].control_hz > cutoff && self.cores[core].consecutive_network_ticks == 0 {
                package_has_hp_not_waiting[package] = true;
            }
        }

        for (core, &package) in self.topology.package_of_core.clone().iter().enumerate() {
            let cutoff = self.hp_cutoff_per_package[package];
            let state = &mut self.cores[core];
            if state.last_hash.is_nan() || state.consecutive_network_ticks >= NETWORK_HINT_MIN_SAMPLE_LENGTH {
                if cutoff.is_finite() {
                    state.control_hz = cutoff;
                }
            } else if !package_has_hp_not_waiting[package]
                && state.consecutive_non_network_ticks >= NON_NETWORK_HINT_MIN_SAMPLE_LENGTH
            {
                state.control_hz = self.config.max_hz;
            }
        }
    }
}

impl Agent for FrequencyBalancerAgent {
    fn name(&self) -> &str {
        "frequency_balancer"
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

        let dt = self.period_seconds.max(1e-6);
        for core in 0..self.cores.len() {
            let raw = self.hwio.sample(self.cores[core].freq_read_slot).unwrap_or(0);
            let achieved_hz = raw as f64 * self.freq_scalar;
            self.cores[core].achieved_hz = achieved_hz;
            self.cores[core].max_hz = self.cores[core].max_hz.max(achieved_hz);

            let sample = self.region_provider.sample(core);
            self.cores[core].last_hash = sample.hash;
            if sample.network_hint {
                self.cores[core].consecutive_network_ticks += 1;
                self.cores[core].consecutive_non_network_ticks = 0;
            } else {
                self.cores[core].consecutive_non_network_ticks += 1;
                self.cores[core].consecutive_network_ticks = 0;
                self.cores[core].epoch_time_seconds += dt;
            }
        }

        self.ticks_since_boundary += 1;
        if self.cores.iter().any(|c| !c.last_hash.is_nan()) {
            self.epochs_counted += 1;
        }

        if self.ticks_since_boundary >= MINIMUM_WAIT_PERIODS && self.epochs_counted >= MINIMUM_EPOCHS {
            self.run_epoch_boundary(dt);
            self.ticks_since_boundary = 0;
            self.epochs_counted = 0;
        } else {
            self.fast_adjust();
        }

        for core in 0..self.cores.len() {
            let ratio = (self.cores[core].control_hz / self.freq_scalar).round() as u64;
            let write_slot = self.cores[core].freq_ctl_write_slot;
            let (value, mask) = self.freq_ctl_shape.pack(ratio);
            self.hwio.adjust(write_slot, value, mask)?;

            if self.use_sst_tf {
                if let Some(clos_slot) = self.cores[core].clos_write_slot {
                    let package = self.topology.package_of_core[core];
                    let cutoff = self.hp_cutoff_per_package[package];
                    let clos = if self.cores[core].control_hz > cutoff {
                        platform::CLOS_HIGH_PRIORITY
                    } else {
                        platform::CLOS_LOW_PRIORITY
                    };
                    self.cores[core].last_clos = clos;
                    let (value, mask) = self.clos_shape.pack(clos);
                    self.hwio.adjust(clos_slot, value, mask)?;
                }
            }
        }
        self.hwio.write_batch()?;

        let mean_hz = self.cores.iter().map(|c| c.control_hz).sum::<f64>() / self.cores.len().max(1) as f64;
        Ok(vec![mean_hz])
    }
}
