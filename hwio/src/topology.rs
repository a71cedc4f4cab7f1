// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Package/core discovery used to size `FrequencyTimeBalancer` subgroups.
//!
//! Narrowed down from the teacher's full NUMA/cache/PCI topology scan to just the two
//! domains the runtime cares about: packages and cores.

use hwlocality::object::types::ObjectType;
use hwlocality::Topology as HwlocTopology;

use runtime::{Result, RtdError};

/// Flat core indices grouped by package, plus the reverse lookup the balancer needs.
#[derive(Debug, Clone)]
pub struct Topology {
    pub package_of_core: Vec<usize>,
    pub num_package: usize,
}

impl Topology {
    /// Probes the local machine's package/core layout via `hwlocality`.
    pub fn probe() -> Result<Self> {
        let topo = HwlocTopology::new()
            .map_err(|e| RtdError::runtime(format!("failed to build hwloc topology: {e}")))?;

        let packages: Vec<_> = topo.objects_with_type(ObjectType::Package).collect();
        let cores: Vec<_> = topo.objects_with_type(ObjectType::Core).collect();

        if packages.is_empty() || cores.is_empty() {
            return Err(RtdError::runtime(
                "hwloc topology reported no packages or no cores",
            ));
        }

        let mut package_of_core = vec![0usize; cores.len()];
        for (core_idx, core) in cores.iter().enumerate() {
            let package_idx = packages
                .iter()
                .position(|pkg| pkg.is_ancestor_of(core) || pkg.cpuset() == core.cpuset())
                .unwrap_or(0);
            package_of_core[core_idx] = package_idx;
        }

        Ok(Topology {
            package_of_core,
            num_package: packages.len(),
        })
    }

    /// Builds a topology directly from a package assignment, bypassing the hwloc probe.
    /// Used by `--fake-hardware` runs and by tests.
    pub fn from_package_of_core(package_of_core: Vec<usize>) -> Self {
        let num_package = package_of_core.iter().copied().max().map_or(0, |m| m + 1);
        Topology {
            package_of_core,
            num_package,
        }
    }

    pub fn num_core(&self) -> usize {
        self.package_of_core.len()
    }
}
