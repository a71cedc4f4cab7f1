// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Policy`: the unit of configuration published by `SetPolicy` and consumed by the loop.

use crate::error::{Result, RtdError};

/// The well-known agent names a `Policy` may select. `""` selects the null/no-op agent,
/// whose period still drives the loop cadence but which performs no sampling or actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Null,
    Monitor,
    PowerGovernor,
    FrequencyBalancer,
    ClosMap,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Null => "",
            AgentKind::Monitor => "monitor",
            AgentKind::PowerGovernor => "power_governor",
            AgentKind::FrequencyBalancer => "frequency_balancer",
            AgentKind::ClosMap => "clos_map",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "" => Ok(AgentKind::Null),
            "monitor" => Ok(AgentKind::Monitor),
            "power_governor" => Ok(AgentKind::PowerGovernor),
            "frequency_balancer" => Ok(AgentKind::FrequencyBalancer),
            "clos_map" => Ok(AgentKind::ClosMap),
            other => Err(RtdError::invalid(format!("unknown agent name: {other}"))),
        }
    }
}

/// Configuration published to the loop. Immutable once constructed; `SetPolicy` replaces the
/// whole object rather than mutating fields in place.
#[derive(Debug, Clone)]
pub struct Policy {
    pub agent: AgentKind,
    pub period_seconds: f64,
    pub profile: String,
    pub params: Vec<f64>,
}

impl Default for Policy {
    /// The policy installed before any `SetPolicy` call: the null agent, woken at the
    /// RPC-handshake latency so the loop can notice a real policy promptly.
    fn default() -> Self {
        Policy {
            agent: AgentKind::Null,
            period_seconds: POLICY_LATENCY_SECONDS,
            profile: String::new(),
            params: Vec::new(),
        }
    }
}

/// Sleep while waiting for the first real policy to arrive.
pub const POLICY_LATENCY_SECONDS: f64 = 5e-3;

impl Policy {
    pub fn new(
        agent_name: &str,
        period_seconds: f64,
        profile: impl Into<String>,
        params: Vec<f64>,
    ) -> Result<Self> {
        if period_seconds < 0.0 {
            return Err(RtdError::invalid(format!(
                "period_seconds must be >= 0, got {period_seconds}"
            )));
        }
        Ok(Policy {
            agent: AgentKind::parse(agent_name)?,
            period_seconds,
            profile: profile.into(),
            params,
        })
    }

    /// `period == 0` is the documented signal to the loop to terminate cleanly.
    pub fn is_stop_signal(&self) -> bool {
        self.period_seconds == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_period() {
        assert!(Policy::new("monitor", -1.0, "", vec![]).is_err());
    }

    #[test]
    fn rejects_unknown_agent() {
        assert!(Policy::new("not-a-real-agent", 1.0, "", vec![]).is_err());
    }

    #[test]
    fn zero_period_is_stop_signal() {
        let p = Policy::new("", 0.0, "", vec![]).unwrap();
        assert!(p.is_stop_signal());
    }
}
