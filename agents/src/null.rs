// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The null agent installed by `Policy::default()` (empty `agent` string): no sampling, no
//! actuation. Its only job is to carry the loop's cadence until a real policy replaces it.

use runtime::{Agent, Result};

pub struct NullAgent {
    period_seconds: f64,
    profile: String,
    metric_names: Vec<String>,
}

impl NullAgent {
    pub fn new(period_seconds: f64, profile: String) -> Self {
        NullAgent {
            period_seconds,
            profile,
            metric_names: Vec::new(),
        }
    }
}

impl Agent for NullAgent {
    fn name(&self) -> &str {
        ""
    }

    fn period(&self) -> f64 {
        self.period_seconds
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    fn update(&mut self) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }
}
