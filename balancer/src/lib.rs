// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `FrequencyTimeBalancer`: a pure function from per-core history to new per-core frequency
//! controls, independently per package subgroup.
//!
//! Rebalances cores within a package to equalize *non-network* completion time: the core
//! with the most outstanding cycle-equivalent work (time × achieved frequency) is held at
//! its best achievable frequency, and every other core in the package is slowed down to the
//! frequency that still finishes within that same wall-clock window. The achievable
//! frequency ceiling for a given count of "high priority" cores comes from a
//! [`FrequencyLimitModel`].

use freqmodel::FrequencyLimitModel;

/// Tunables that don't vary per call: the uncertainty margin added to every desired
/// frequency, and the global clamp range.
#[derive(Debug, Clone, Copy)]
pub struct BalancerConfig {
    pub uncertainty_window_seconds: f64,
    pub min_hz: f64,
    pub max_hz: f64,
}

/// Per-subgroup side effects the balancer records for diagnostics/reporting: the
/// wall-clock target the subgroup converged on, and the high/low-priority split frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubgroupOutcome {
    pub target_time_seconds: f64,
    pub cutoff_hz: f64,
}

fn cycle_equivalent(time: f64, achieved_hz: f64) -> f64 {
    time * achieved_hz
}

/// Recomputes per-core frequency controls for every subgroup (package) named by
/// `package_of_core`. All input slices must be the same length (one entry per core).
/// `ignore[core]` marks a core the balancer must leave untouched (its previous control is
/// returned unchanged). Returns the new per-core control frequencies and, per package, the
/// [`SubgroupOutcome`] the balancer settled on.
#[allow(clippy::too_many_arguments)]
pub fn balance(
    package_of_core: &[usize],
    previous_time: &[f64],
    previous_control_hz: &[f64],
    previous_achieved_hz: &[f64],
    previous_max_hz: &[f64],
    ignore: &[bool],
    hp_core_count_per_package: &[usize],
    model: &mut dyn FrequencyLimitModel,
    config: &BalancerConfig,
) -> (Vec<f64>, Vec<SubgroupOutcome>) {
    let num_core = package_of_core.len();
    assert_eq!(previous_time.len(), num_core);
    assert_eq!(previous_control_hz.len(), num_core);
    assert_eq!(previous_achieved_hz.len(), num_core);
    assert_eq!(previous_max_hz.len(), num_core);
    assert_eq!(ignore.len(), num_core);

    model.update_max_frequency_estimates(previous_max_hz, hp_core_count_per_package);

    let num_package = package_of_core.iter().copied().max().map_or(0, |m| m + 1);
    let mut output = previous_control_hz.to_vec();
    let mut outcomes = vec![SubgroupOutcome::default(); num_package];

    let effective_ignore =
        |c: usize| ignore[c] || previous_time[c].is_nan() || previous_achieved_hz[c].is_nan();

    for package in 0..num_package {
        let idxs: Vec<usize> = package_of_core
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p == package)
            .map(|(i, _)| i)
            .collect();
        if idxs.is_empty() {
            continue;
        }

        // Reset rule: if nothing is currently unthrottled, there is no reference to balance
        // against; drive every core (including ignored ones) back to max.
        if !idxs.iter().any(|&c| previous_control_hz[c] >= config.max_hz) {
            for &c in &idxs {
                output[c] = config.max_hz;
            }
            outcomes[package] = SubgroupOutcome {
                target_time_seconds: 0.0,
                cutoff_hz: config.max_hz,
            };
            continue;
        }

        // Argsort descending by cycle-equivalent time; ignored/NaN cores sort to the end
        // in their original relative order.
        let mut sorted = idxs.clone();
        sorted.sort_by(|&a, &b| {
            let ea = effective_ignore(a);
            let eb = effective_ignore(b);
            match (ea, eb) {
                (true, true) | (false, false) => {
                    if ea {
                        std::cmp::Ordering::Equal
                    } else {
                        let ca = cycle_equivalent(previous_time[a], previous_achieved_hz[a]);
                        let cb = cycle_equivalent(previous_time[b], previous_achieved_hz[b]);
                        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
                    }
                }
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
            }
        });

        let reference = sorted
            .iter()
            .find(|&&c| !effective_ignore(c) && previous_control_hz[c] >= config.max_hz)
            .copied()
            .unwrap_or(sorted[0]);

        let mut target_time = previous_time[reference];
        let mut hp_cutoff = f64::NEG_INFINITY;

        let tradeoffs = model.get_core_frequency_limits(reference).to_vec();
        let lead_cycles = cycle_equivalent(previous_time[sorted[0]], previous_achieved_hz[sorted[0]]);
        let lp_hz = model.get_core_low_priority_frequency(reference);

        for (hp_count, hp_hz) in tradeoffs {
            let hp_laggard_time = lead_cycles / hp_hz;
            let lp_laggard_time = if hp_count < idxs.len() {
                sorted
                    .get(hp_count)
                    .map(|&c| cycle_equivalent(previous_time[c], previous_achieved_hz[c]) / lp_hz)
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            let predicted = hp_laggard_time.max(lp_laggard_time);
            if predicted < target_time {
                target_time = predicted;
                hp_cutoff = if hp_count < idxs.len() {
                    lp_hz
                } else {
                    f64::NEG_INFINITY
                };
            }
        }

        // Division by target_time==0 would require infinite frequency; treat it the same
        // as the reset rule.
        if target_time == 0.0 {
            for &c in &idxs {
                output[c] = config.max_hz;
            }
            outcomes[package] = SubgroupOutcome {
                target_time_seconds: 0.0,
                cutoff_hz: config.max_hz,
            };
            continue;
        }

        let mut is_lp = vec![false; idxs.len()];
        for (slot, &c) in idxs.iter().enumerate() {
            if effective_ignore(c) {
                output[c] = previous_control_hz[c];
                continue;
            }
            let mut desired = if previous_time[c] == 0.0 {
                if hp_cutoff.is_finite() {
                    hp_cutoff
                } else {
                    lp_hz
                }
            } else {
                previous_achieved_hz[c] * previous_time[c] / target_time
            };

            let lp = hp_cutoff.is_finite() && desired <= hp_cutoff;
            is_lp[slot] = lp;

            desired += desired * config.uncertainty_window_seconds / target_time;

            if lp {
                desired = desired.min(hp_cutoff);
            }
            output[c] = desired.clamp(config.min_hz, config.max_hz);
        }

        // Renormalization: if nothing reached max_hz, there is residual headroom; scale
        // everything up while preserving the HP/LP partition.
        let max_assigned = idxs
            .iter()
            .filter(|&&c| !effective_ignore(c))
            .map(|&c| output[c])
            .fold(f64::NEG_INFINITY, f64::max);
        if max_assigned.is_finite() && max_assigned > 0.0 && max_assigned < config.max_hz {
            let scale = config.max_hz / max_assigned;
            for (slot, &c) in idxs.iter().enumerate() {
                if effective_ignore(c) {
                    continue;
                }
                let mut scaled = output[c] * scale;
                if is_lp[slot] {
                    scaled = scaled.min(hp_cutoff);
                }
                output[c] = scaled.clamp(config.min_hz, config.max_hz);
            }
        }

        outcomes[package] = SubgroupOutcome {
            target_time_seconds: target_time,
            cutoff_hz: hp_cutoff,
        };
    }

    (output, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freqmodel::{CoreTopology, Trl};

    fn one_package(num_core: usize) -> Vec<usize> {
        vec![0; num_core]
    }

    #[test]
    fn s1_one_lagger() {
        let package_of_core = one_package(4);
        let previous_time = vec![1.0, 1.0, 2.0, 1.0];
        let previous_control = vec![3.0e9, 3.0e9, 3.0e9, 3.0e9];
        let previous_achieved = previous_control.clone();
        let previous_max = previous_control.clone();
        let ignore = vec![false; 4];
        let config = BalancerConfig {
            uncertainty_window_seconds: 0.0,
            min_hz: 1.0e9,
            max_hz: 3.0e9,
        };
        let topo = CoreTopology::new(package_of_core.clone());
        let mut model = Trl::new(topo, 2.0e9);

        let (output, _) = balance(
            &package_of_core,
            &previous_time,
            &previous_control,
            &previous_achieved,
            &previous_max,
            &ignore,
            &[4],
            &mut model,
            &config,
        );

        let expected = [1.5e9, 1.5e9, 3.0e9, 1.5e9];
        for (got, want) in output.iter().zip(expected) {
            assert!((got - want).abs() < 1.0, "got {got} want {want}");
        }
    }

    #[test]
    fn s2_reset_rule() {
        let package_of_core = one_package(4);
        let previous_time = vec![4.0, 3.0, 2.0, 1.0];
        let previous_control = vec![4.0e9, 3.0e9, 2.0e9, 1.0e9];
        let previous_achieved = previous_control.clone();
        let previous_max = previous_control.clone();
        let ignore = vec![false; 4];
        let config = BalancerConfig {
            uncertainty_window_seconds: 0.0,
            min_hz: 1.0e9,
            max_hz: 5.0e9,
        };
        let topo = CoreTopology::new(package_of_core.clone());
        let mut model = Trl::new(topo, 2.0e9);

        let (output, _) = balance(
            &package_of_core,
            &previous_time,
            &previous_control,
            &previous_achieved,
            &previous_max,
            &ignore,
            &[4],
            &mut model,
            &config,
        );

        for got in output {
            assert!((got - 5.0e9).abs() < 1.0);
        }
    }

    #[test]
    fn s3_negative_times() {
        let package_of_core = one_package(4);
        let previous_time = vec![-1.0, -2.0, -3.0, -4.0];
        let previous_control = vec![4.0e9, 1.0e9, 1.0e9, 1.0e9];
        let previous_achieved = previous_control.clone();
        let previous_max = previous_control.clone();
        let ignore = vec![false; 4];
        let config = BalancerConfig {
            uncertainty_window_seconds: 0.0,
            min_hz: 0.9e9,
            max_hz: 4.0e9,
        };
        let topo = CoreTopology::new(package_of_core.clone());
        let mut model = Trl::new(topo, 2.0e9);

        let (output, _) = balance(
            &package_of_core,
            &previous_time,
            &previous_control,
            &previous_achieved,
            &previous_max,
            &ignore,
            &[4],
            &mut model,
            &config,
        );

        let expected = [4.0e9, 2.0e9, 3.0e9, 4.0e9];
        for (got, want) in output.iter().zip(expected) {
            assert!((got - want).abs() < 1.0, "got {got} want {want}");
        }
    }

    #[test]
    fn ignored_core_keeps_previous_control() {
        let package_of_core = one_package(2);
        let previous_time = vec![1.0, 5.0];
        let previous_control = vec![3.0e9, 1.0e9];
        let previous_achieved = previous_control.clone();
        let previous_max = previous_control.clone();
        let ignore = vec![false, true];
        let config = BalancerConfig {
            uncertainty_window_seconds: 0.0,
            min_hz: 1.0e9,
            max_hz: 3.0e9,
        };
        let topo = CoreTopology::new(package_of_core.clone());
        let mut model = Trl::new(topo, 2.0e9);

        let (output, _) = balance(
            &package_of_core,
            &previous_time,
            &previous_control,
            &previous_achieved,
            &previous_max,
            &ignore,
            &[2],
            &mut model,
            &config,
        );

        assert_eq!(output[1], 1.0e9);
    }
}
