// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The tagged-variant agent factory: turns a published [`Policy`] into a `Box<dyn Agent>`.

use std::sync::Arc;

use hwio::{HardwareIo, MsrDescriptionTable, Topology};
use runtime::{Agent, AgentFactory, AgentKind, Policy, Result};

use crate::clos_map::ClosMapAgent;
use crate::freq_balancer::FrequencyBalancerAgent;
use crate::monitor::MonitorAgent;
use crate::null::NullAgent;
use crate::power_cap::PowerGovernorAgent;
use crate::region::NullRegionProvider;

/// Everything a freshly-installed agent needs besides the policy itself: the CPU set,
/// topology, MSR description table, and whether to use the in-memory fake hardware backend.
pub struct AgentContext {
    pub cpus: Vec<u32>,
    pub topology: Topology,
    pub description: Arc<MsrDescriptionTable>,
    pub fake_hardware: bool,
}

impl AgentContext {
    fn open_hwio(&self) -> Result<HardwareIo> {
        if self.fake_hardware {
            Ok(HardwareIo::fake())
        } else {
            HardwareIo::open(&self.cpus)
        }
    }
}

/// Implements [`AgentFactory`] by matching on [`AgentKind`] and constructing the
/// corresponding concrete agent. Agents, models, and backends are all closed tagged-variant
/// enumerations per the design's polymorphism guidance, rather than an open trait registry.
pub struct Factory {
    context: AgentContext,
}

impl Factory {
    pub fn new(context: AgentContext) -> Self {
        Factory { context }
    }
}

impl AgentFactory for Factory {
    fn make_agent(&mut self, policy: &Policy) -> Result<Box<dyn Agent>> {
        let ctx = &self.context;
        let agent: Box<dyn Agent> = match policy.agent {
            AgentKind::Null => Box::new(NullAgent::new(policy.period_seconds, policy.profile.clone())),
            AgentKind::Monitor => Box::new(MonitorAgent::new(
                policy.period_seconds,
                policy.profile.clone(),
                &ctx.cpus,
                ctx.open_hwio()?,
                &ctx.description,
            )?),
            AgentKind::PowerGovernor => Box::new(PowerGovernorAgent::new(
                policy.period_seconds,
                policy.profile.clone(),
                &policy.params,
                &ctx.cpus,
                ctx.open_hwio()?,
                &ctx.description,
            )?),
            AgentKind::FrequencyBalancer => Box::new(FrequencyBalancerAgent::new(
                policy.period_seconds,
                policy.profile.clone(),
                &policy.params,
                &ctx.cpus,
                ctx.topology.clone(),
                ctx.open_hwio()?,
                &ctx.description,
                Box::new(NullRegionProvider),
            )?),
            AgentKind::ClosMap => Box::new(ClosMapAgent::new(
                policy.period_seconds,
                policy.profile.clone(),
                &policy.params,
                &ctx.cpus,
                ctx.open_hwio()?,
                &ctx.description,
                Box::new(NullRegionProvider),
            )?),
        };
        Ok(agent)
    }
}
