// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{CoreTopology, FrequencyLimitModel};

/// One firmware-published bucket: the max achievable frequency at each license level when
/// `max_hp_cores` (or fewer) cores are running at high priority.
#[derive(Debug, Clone, Copy)]
pub struct Bucket {
    pub max_hp_cores: usize,
    pub sse_hz: f64,
    pub avx2_hz: f64,
    pub avx512_hz: f64,
}

/// The per-package firmware configuration: bucket table (sorted ascending by
/// `max_hp_cores`), the all-core-turbo fallback frequency, and the three license-level
/// low-priority frequencies.
#[derive(Debug, Clone)]
pub struct LicenseBucketTable {
    pub enabled: bool,
    pub buckets: Vec<Bucket>,
    pub all_core_turbo_hz: f64,
    pub lp_sse_hz: f64,
    pub lp_avx2_hz: f64,
    pub lp_avx512_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum License {
    Sse,
    Avx2,
    Avx512,
}

fn infer_license(observed_hz: f64, bucket: &Bucket) -> License {
    if observed_hz >= bucket.sse_hz || observed_hz > bucket.avx2_hz {
        License::Sse
    } else if observed_hz >= bucket.avx2_hz || observed_hz > bucket.avx512_hz {
        License::Avx2
    } else {
        License::Avx512
    }
}

fn bucket_freq(bucket: &Bucket, license: License) -> f64 {
    match license {
        License::Sse => bucket.sse_hz,
        License::Avx2 => bucket.avx2_hz,
        License::Avx512 => bucket.avx512_hz,
    }
}

fn lp_freq(table: &LicenseBucketTable, license: License) -> f64 {
    match license {
        License::Sse => table.lp_sse_hz,
        License::Avx2 => table.lp_avx2_hz,
        License::Avx512 => table.lp_avx512_hz,
    }
}

/// Speed Select Turbo Frequency model: per-package firmware bucket tables keyed by the
/// current high-priority core count, with the per-core license level (SSE/AVX2/AVX512)
/// inferred from the core's own observed frequency.
pub struct SstTf {
    topology: CoreTopology,
    tables: Vec<LicenseBucketTable>,
    tradeoffs: Vec<Vec<(usize, f64)>>,
    low_priority: Vec<f64>,
}

impl SstTf {
    pub fn new(topology: CoreTopology, tables: Vec<LicenseBucketTable>) -> Self {
        assert_eq!(
            tables.len(),
            topology.num_package,
            "one bucket table is required per package"
        );
        let num_core = topology.num_core();
        SstTf {
            topology,
            tables,
            tradeoffs: vec![Vec::new(); num_core],
            low_priority: vec![f64::NAN; num_core],
        }
    }

    fn find_bucket<'a>(table: &'a LicenseBucketTable, hp_count: usize) -> Option<&'a Bucket> {
        table
            .buckets
            .iter()
            .find(|bucket| bucket.max_hp_cores >= hp_count)
    }
}

impl FrequencyLimitModel for SstTf {
    fn update_max_frequency_estimates(&mut self, observed_hz: &[f64], hp_core_count_per_package: &[usize]) {
        for package in 0..self.topology.num_package {
            let table = &self.tables[package];
            let cores_in_package = self.topology.cores_in_package(package);
            let hp_count = hp_core_count_per_package.get(package).copied().unwrap_or(0);

            if !table.enabled {
                let max_hz = self
                    .topology
                    .package_of_core
                    .iter()
                    .zip(observed_hz)
                    .filter(|(&p, _)| p == package)
                    .map(|(_, &hz)| hz)
                    .filter(|hz| !hz.is_nan())
                    .fold(f64::NEG_INFINITY, f64::max);
                let max_hz = if max_hz.is_finite() { max_hz } else { table.all_core_turbo_hz };
                for (core, &p) in self.topology.package_of_core.iter().enumerate() {
                    if p == package {
                        self.tradeoffs[core] = vec![(cores_in_package, max_hz)];
                        self.low_priority[core] = table.all_core_turbo_hz;
                    }
                }
                continue;
            }

            let bucket = Self::find_bucket(table, hp_count);

            for (core, &p) in self.topology.package_of_core.iter().enumerate() {
                if p != package {
                    continue;
                }
                let observed = observed_hz.get(core).copied().unwrap_or(f64::NAN);
                match bucket {
                    Some(bucket) => {
                        let license = infer_license(observed, bucket);
                        self.tradeoffs[core] = table
                            .buckets
                            .iter()
                            .map(|b| (b.max_hp_cores, bucket_freq(b, license)))
                            .collect();
                        self.low_priority[core] = lp_freq(table, license);
                    }
                    None => {
                        self.tradeoffs[core] = vec![(cores_in_package, table.all_core_turbo_hz)];
                        self.low_priority[core] = table.lp_sse_hz;
                    }
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

    fn table() -> LicenseBucketTable {
        LicenseBucketTable {
            enabled: true,
            buckets: vec![
                Bucket { max_hp_cores: 2, sse_hz: 3.6e9, avx2_hz: 3.5e9, avx512_hz: 3.4e9 },
                Bucket { max_hp_cores: 3, sse_hz: 3.3e9, avx2_hz: 3.2e9, avx512_hz: 3.1e9 },
                Bucket { max_hp_cores: 4, sse_hz: 3.0e9, avx2_hz: 2.9e9, avx512_hz: 2.8e9 },
            ],
            all_core_turbo_hz: 2.5e9,
            lp_sse_hz: 2.0e9,
            lp_avx2_hz: 1.9e9,
            lp_avx512_hz: 1.8e9,
        }
    }

    // S6: bucket inference scenario.
    #[test]
    fn s6_infers_license_per_core() {
        let topo = CoreTopology::new(vec![0, 0]);
        let mut model = SstTf::new(topo, vec![table()]);
        model.update_max_frequency_estimates(&[3.55e9, 3.2e9], &[2]);

        // core0 observed 3.55 >= sse(3.6)? no. > avx2(3.5)? yes -> SSE.
        assert_eq!(model.get_core_low_priority_frequency(0), 2.0e9);
        // core1 observed 3.2 >= avx2(3.5)? no. > avx512(3.4)? no -> AVX512.
        assert_eq!(model.get_core_low_priority_frequency(1), 1.8e9);
    }

    #[test]
    fn disabled_package_behaves_like_trl() {
        let mut t = table();
        t.enabled = false;
        let topo = CoreTopology::new(vec![0, 0]);
        let mut model = SstTf::new(topo, vec![t]);
        model.update_max_frequency_estimates(&[3.0e9, 2.5e9], &[0]);
        assert_eq!(model.get_core_frequency_limits(0), &[(2, 3.0e9)]);
        assert_eq!(model.get_core_low_priority_frequency(0), 2.5e9);
    }

    #[test]
    fn missing_bucket_falls_back_to_all_core_turbo() {
        let topo = CoreTopology::new(vec![0]);
        let mut model = SstTf::new(topo, vec![table()]);
        model.update_max_frequency_estimates(&[3.0e9], &[10]);
        assert_eq!(model.get_core_frequency_limits(0), &[(1, 2.5e9)]);
    }
}
