// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The single dedicated sampling/control loop thread.

use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::error::{Result, RtdError};
use crate::policy::Policy;
use crate::shared::SharedState;
use crate::waiter::Waiter;

/// Builds a concrete `Agent` for a freshly-published `Policy`. Implemented in the `agents`
/// crate as the tagged-variant factory; kept as a trait object here so `runtime` never
/// depends on the concrete agent implementations (which in turn depend on `runtime`).
pub trait AgentFactory: Send {
    fn make_agent(&mut self, policy: &Policy) -> Result<Box<dyn Agent>>;
}

/// Runs the sampling/control loop until a policy with `period_seconds == 0` is installed.
/// Intended to run on its own OS thread; blocks the calling thread for the loop's lifetime.
pub fn run_loop(shared: SharedState, mut factory: impl AgentFactory) {
    let mut agent: Option<Box<dyn Agent>> = None;
    let mut waiter = Waiter::new(crate::policy::POLICY_LATENCY_SECONDS);

    let result = loop {
        if let Some(policy) = shared.take_updated_policy() {
            if policy.is_stop_signal() {
                info!("policy period is zero, stopping sampling loop");
                break Ok(());
            }
            let built = match factory.make_agent(&policy) {
                Ok(a) => a,
                Err(e) => break Err(e),
            };
            info!(agent = built.name(), period = built.period(), "installed new agent");
            shared.reset_stats(built.metric_names().to_vec());
            waiter = Waiter::new(built.period());
            agent = Some(built);
        }

        let Some(agent) = agent.as_mut() else {
            break Err(RtdError::runtime(
                "loop reached sampling step with no agent installed",
            ));
        };

        let sample = match agent.update() {
            Ok(s) => s,
            Err(e) => break Err(e),
        };

        if let Err(e) = shared.update_stats(&sample) {
            warn!(error = %e, "stats update rejected sample, terminating loop");
            break Err(e);
        }

        waiter.wait();
    };

    if let Err(e) = result {
        error!(error = %e, "sampling loop terminated");
        shared.record_loop_error(e.to_string());
    } else {
        debug!("sampling loop terminated cleanly");
    }
}
