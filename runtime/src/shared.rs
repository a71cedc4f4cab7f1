// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The mutex-guarded `policy` / `is_updated` / `stats` handshake between the RPC thread and
//! the sampling/control loop thread.

use concurrency::sync::Mutex;
use std::sync::Arc;

use crate::policy::Policy;
use crate::stats::Stats;

struct Inner {
    policy: Policy,
    is_updated: bool,
    stats: Stats,
    /// Set by the loop thread if it terminates due to an error; surfaced on the next
    /// `GetReport` rather than panicking the process.
    last_error: Option<String>,
}

/// Shared state `S = { lock, is_updated, policy, stats }` from the design, expressed as a
/// single mutex-guarded struct behind an `Arc` so the RPC service and the loop can each hold
/// a cheap handle to it.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    /// `is_updated` starts `true` so the loop installs the initial policy (the null agent,
    /// by default) on its very first iteration.
    pub fn new(initial_policy: Policy) -> Self {
        SharedState {
            inner: Arc::new(Mutex::new(Inner {
                policy: initial_policy,
                is_updated: true,
                stats: Stats::new(Vec::new()),
                last_error: None,
            })),
        }
    }

    /// `SetPolicy`: replaces the active policy, marks it updated, and returns the previous
    /// policy so the caller can echo it back in the RPC response.
    pub fn set_policy(&self, policy: Policy) -> Policy {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let previous = guard.policy.clone();
        guard.policy = policy;
        guard.is_updated = true;
        previous
    }

    /// Called only by the loop thread. If a new policy is pending, clears the flag and
    /// returns a copy of it; otherwise returns `None`.
    pub fn take_updated_policy(&self) -> Option<Policy> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_updated {
            guard.is_updated = false;
            Some(guard.policy.clone())
        } else {
            None
        }
    }

    /// Called only by the loop thread to reset the stats accumulator's metric set when a
    /// new agent is installed (its metric names may differ from the previous agent's).
    pub fn reset_stats(&self, metric_names: Vec<String>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.stats = Stats::new(metric_names);
    }

    /// Called only by the loop thread after each `Agent::update()`.
    pub fn update_stats(&self, sample: &[f64]) -> crate::error::Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.stats.update(sample)
    }

    /// `GetReport`: snapshots the stats accumulator under the lock.
    pub fn snapshot_stats(&self) -> Stats {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.stats.clone()
    }

    /// Called only by the loop thread when it terminates due to an error.
    pub fn record_loop_error(&self, message: String) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.last_error = Some(message);
    }

    /// The last loop error, if the loop has terminated abnormally. Surfaced via `GetReport`.
    pub fn last_error(&self) -> Option<String> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.last_error.clone()
    }
}
