// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The `Agent` trait: the shape every policy-driven controller implements.

use crate::error::Result;
use crate::policy::Policy;

/// Implemented by every concrete agent (monitor, power-cap, frequency-balancer, clos-map).
/// `make_agent` in the `agents` crate is the tagged-variant factory that turns a `Policy`
/// into a `Box<dyn Agent>`; this trait only describes the lifecycle the loop drives.
pub trait Agent: Send {
    /// The agent's name, as it would appear in `Policy::agent`.
    fn name(&self) -> &str;

    /// Loop cadence in seconds; `0.0` tells the loop to terminate after this agent is
    /// installed.
    fn period(&self) -> f64;

    /// Opaque profile string carried through from the installing policy.
    fn profile(&self) -> &str;

    /// Ordered metric names this agent reports; `update()`'s result must have the same
    /// length.
    fn metric_names(&self) -> &[String];

    /// Sample the platform (and, for controlling agents, compute and flush new writes),
    /// returning one value per `metric_names()` entry (NaN for unavailable signals).
    fn update(&mut self) -> Result<Vec<f64>>;
}
