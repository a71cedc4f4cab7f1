// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared-state handshake, statistics accumulator, and the sampling/control loop that ties
//! agents and the RPC service together.

mod agent;
mod error;
mod policy;
mod run_loop;
mod shared;
mod stats;
mod waiter;

pub use agent::Agent;
pub use error::{Result, RtdError};
pub use policy::{AgentKind, Policy, POLICY_LATENCY_SECONDS};
pub use run_loop::{run_loop, AgentFactory};
pub use shared::SharedState;
pub use stats::Stats;
pub use waiter::Waiter;
