// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Online per-metric moment accumulator, read by `GetReport` and written only by the loop.

use crate::error::{Result, RtdError};

#[derive(Debug, Clone, Copy)]
struct Moments {
    count: u64,
    first: f64,
    last: f64,
    min: f64,
    max: f64,
    m1: f64,
    m2: f64,
    m3: f64,
    m4: f64,
}

impl Moments {
    const fn zero() -> Self {
        Moments {
            count: 0,
            first: f64::NAN,
            last: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            m1: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
        }
    }
}

/// Holds, per named metric, a running count and raw (not centered) power sums, from which
/// mean/std are derived on demand. `first`/`last`/`min`/`max`/`mean`/`std` are NaN while
/// `count == 0`.
#[derive(Debug, Clone)]
pub struct Stats {
    metric_names: Vec<String>,
    moments: Vec<Moments>,
}

impl Stats {
    pub fn new(metric_names: Vec<String>) -> Self {
        let moments = vec![Moments::zero(); metric_names.len()];
        Stats {
            metric_names,
            moments,
        }
    }

    pub fn num_metric(&self) -> usize {
        self.metric_names.len()
    }

    pub fn metric_name(&self, idx: usize) -> Result<&str> {
        self.metric_names
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| RtdError::invalid(format!("metric_idx out of range: {idx}")))
    }

    pub fn reset(&mut self) {
        for m in &mut self.moments {
            m.count = 0;
            m.m1 = 0.0;
            m.m2 = 0.0;
            m.m3 = 0.0;
            m.m4 = 0.0;
        }
    }

    /// Folds one sample vector into the accumulators. `sample.len()` must equal the number
    /// of configured metrics.
    pub fn update(&mut self, sample: &[f64]) -> Result<()> {
        if sample.len() != self.moments.len() {
            return Err(RtdError::invalid(format!(
                "invalid input vector size: {}",
                sample.len()
            )));
        }
        for (m, &value) in self.moments.iter_mut().zip(sample) {
            m.count += 1;
            if m.count == 1 {
                m.first = value;
                m.min = value;
                m.max = value;
            }
            m.last = value;
            if m.min > value {
                m.min = value;
            }
            if m.max < value {
                m.max = value;
            }
            let mut power = value;
            m.m1 += power;
            power *= value;
            m.m2 += power;
            power *= value;
            m.m3 += power;
            power *= value;
            m.m4 += power;
        }
        Ok(())
    }

    fn get(&self, idx: usize) -> Result<&Moments> {
        self.moments
            .get(idx)
            .ok_or_else(|| RtdError::invalid(format!("metric_idx out of range: {idx}")))
    }

    pub fn count(&self, idx: usize) -> Result<u64> {
        Ok(self.get(idx)?.count)
    }

    pub fn first(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count != 0 { m.first } else { f64::NAN })
    }

    pub fn last(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count != 0 { m.last } else { f64::NAN })
    }

    pub fn min(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count != 0 { m.min } else { f64::NAN })
    }

    pub fn max(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count != 0 { m.max } else { f64::NAN })
    }

    pub fn mean(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count != 0 {
            m.m1 / m.count as f64
        } else {
            f64::NAN
        })
    }

    pub fn std(&self, idx: usize) -> Result<f64> {
        let m = self.get(idx)?;
        Ok(if m.count > 1 {
            let n = m.count as f64;
            ((m.m2 - m.m1 * m.m1 / n) / (n - 1.0)).sqrt()
        } else {
            f64::NAN
        })
    }

    pub fn skew(&self, idx: usize) -> Result<f64> {
        self.get(idx)?;
        Err(RtdError::NotImplemented("Stats::skew"))
    }

    pub fn kurt(&self, idx: usize) -> Result<f64> {
        self.get(idx)?;
        Err(RtdError::NotImplemented("Stats::kurt"))
    }

    pub fn lse_linear_0(&self, idx: usize) -> Result<f64> {
        self.get(idx)?;
        Err(RtdError::NotImplemented("Stats::lse_linear_0"))
    }

    pub fn lse_linear_1(&self, idx: usize) -> Result<f64> {
        self.get(idx)?;
        Err(RtdError::NotImplemented("Stats::lse_linear_1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S4 from the testable-properties scenarios.
    #[test]
    fn s4_two_metrics_three_updates() {
        let mut stats = Stats::new(vec!["a".to_string(), "b".to_string()]);
        stats.update(&[1.0, 10.0]).unwrap();
        stats.update(&[2.0, 20.0]).unwrap();
        stats.update(&[3.0, 30.0]).unwrap();

        assert_eq!(stats.count(0).unwrap(), 3);
        assert_eq!(stats.count(1).unwrap(), 3);
        assert!((stats.mean(0).unwrap() - 2.0).abs() < 1e-9);
        assert!((stats.mean(1).unwrap() - 20.0).abs() < 1e-9);
        assert!((stats.std(0).unwrap() - 1.0).abs() < 1e-9);
        assert!((stats.std(1).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(stats.first(0).unwrap(), 1.0);
        assert_eq!(stats.first(1).unwrap(), 10.0);
        assert_eq!(stats.last(0).unwrap(), 3.0);
        assert_eq!(stats.last(1).unwrap(), 30.0);
        assert_eq!(stats.min(0).unwrap(), 1.0);
        assert_eq!(stats.max(0).unwrap(), 3.0);
    }

    #[test]
    fn empty_stats_are_nan() {
        let stats = Stats::new(vec!["x".to_string()]);
        assert_eq!(stats.count(0).unwrap(), 0);
        assert!(stats.first(0).unwrap().is_nan());
        assert!(stats.mean(0).unwrap().is_nan());
        assert!(stats.std(0).unwrap().is_nan());
    }

    #[test]
    fn rejects_wrong_length_sample() {
        let mut stats = Stats::new(vec!["x".to_string(), "y".to_string()]);
        assert!(stats.update(&[1.0]).is_err());
    }

    #[test]
    fn higher_moments_not_implemented() {
        let stats = Stats::new(vec!["x".to_string()]);
        assert!(stats.skew(0).is_err());
        assert!(stats.kurt(0).is_err());
    }
}
