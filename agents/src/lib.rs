// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Policy-driven controllers built on top of `hwio`, `freqmodel`, and `balancer`: the
//! concrete `Agent` implementations the sampling/control loop installs.

mod clos_map;
mod factory;
mod freq_balancer;
mod monitor;
mod null;
mod platform;
mod power_cap;
mod region;
mod sst_config;

pub use clos_map::ClosMapAgent;
pub use factory::{AgentContext, Factory};
pub use freq_balancer::FrequencyBalancerAgent;
pub use monitor::MonitorAgent;
pub use null::NullAgent;
pub use power_cap::{ConvergenceFilter, PowerGovernorAgent};
pub use region::{NullRegionProvider, RegionProvider, RegionSample};
