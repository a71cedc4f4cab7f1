// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{CoreTopology, FrequencyLimitModel};

/// Turbo Ratio Limit model: assumes any core in a package can reach the package's maximum
/// recently-observed frequency. Produces a single tradeoff point per package.
pub struct Trl {
    topology: CoreTopology,
    sticker_hz: f64,
    tradeoffs: Vec<Vec<(usize, f64)>>,
    low_priority: Vec<f64>,
}

impl Trl {
    pub fn new(topology: CoreTopology, sticker_hz: f64) -> Self {
        let num_core = topology.num_core();
        Trl {
            topology,
            sticker_hz,
            tradeoffs: vec![Vec::new(); num_core],
            low_priority: vec![sticker_hz; num_core],
        }
    }
}

impl FrequencyLimitModel for Trl {
    fn update_max_frequency_estimates(&mut self, observed_hz: &[f64], _hp_core_count_per_package: &[usize]) {
        for package in 0..self.topology.num_package {
            let cores_in_package = self.topology.cores_in_package(package);
            let max_hz = self
                .topology
                .package_of_core
                .iter()
                .zip(observed_hz)
                .filter(|(&p, _)| p == package)
                .map(|(_, &hz)| hz)
                .filter(|hz| !hz.is_nan())
                .fold(f64::NEG_INFINITY, f64::max);
            let max_hz = if max_hz.is_finite() { max_hz } else { self.sticker_hz };

            for (core, &p) in self.topology.package_of_core.iter().enumerate() {
                if p == package {
                    self.tradeoffs[core] = vec![(cores_in_package, max_hz)];
                    self.low_priority[core] = self.sticker_hz;
                }
            }
        }
    }

    fn get_core_frequency_limits(&self, core: usize) -> &[(usize, f64)] {
        &self.tradeoffs[core]
    }

    fn get_core_low_priority_frequency(&self, core: usize) -> f64 {
        self.low_priority[core]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tradeoff_at_package_max() {
        let topo = CoreTopology::new(vec![0, 0, 1, 1]);
        let mut model = Trl::new(topo, 2.0e9);
        model.update_max_frequency_estimates(&[3.0e9, 2.5e9, 4.0e9, 3.5e9], &[]);

        assert_eq!(model.get_core_frequency_limits(0), &[(2, 3.0e9)]);
        assert_eq!(model.get_core_frequency_limits(1), &[(2, 3.0e9)]);
        assert_eq!(model.get_core_frequency_limits(2), &[(2, 4.0e9)]);
        assert_eq!(model.get_core_low_priority_frequency(0), 2.0e9);
    }

    #[test]
    fn falls_back_to_sticker_when_all_observations_nan() {
        let topo = CoreTopology::new(vec![0, 0]);
        let mut model = Trl::new(topo, 2.0e9);
        model.update_max_frequency_estimates(&[f64::NAN, f64::NAN], &[]);
        assert_eq!(model.get_core_frequency_limits(0), &[(2, 2.0e9)]);
    }
}
