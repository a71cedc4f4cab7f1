// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loader for the optional per-package SST-TF bucket table JSON, selected via `Policy.profile`.
//!
//! When the profile names no file, or the named file doesn't parse into one table per
//! package, every package falls back to a disabled table: [`SstTf`](freqmodel::SstTf) then
//! behaves exactly like [`Trl`](freqmodel::Trl) for that package, which is the documented
//! fallback in the frequency-limit model's own design.

use freqmodel::{Bucket, LicenseBucketTable};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawBucket {
    max_hp_cores: usize,
    sse_hz: f64,
    avx2_hz: f64,
    avx512_hz: f64,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    enabled: bool,
    buckets: Vec<RawBucket>,
    all_core_turbo_hz: f64,
    lp_sse_hz: f64,
    lp_avx2_hz: f64,
    lp_avx512_hz: f64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    packages: Vec<RawTable>,
}

fn disabled_tables(num_package: usize, sticker_hz: f64) -> Vec<LicenseBucketTable> {
    (0..num_package)
        .map(|_| LicenseBucketTable {
            enabled: false,
            buckets: Vec::new(),
            all_core_turbo_hz: sticker_hz,
            lp_sse_hz: sticker_hz,
            lp_avx2_hz: sticker_hz,
            lp_avx512_hz: sticker_hz,
        })
        .collect()
}

/// Loads `profile` as a bucket-table config; falls back to disabled tables (TRL-equivalent
/// behavior) if `profile` is empty, unreadable, malformed, or doesn't name one table per
/// package.
pub fn load_or_fallback(profile: &str, num_package: usize, sticker_hz: f64) -> Vec<LicenseBucketTable> {
    if profile.is_empty() {
        return disabled_tables(num_package, sticker_hz);
    }

    let parsed = std::fs::read_to_string(profile)
        .ok()
        .and_then(|text| serde_json::from_str::<RawConfig>(&text).ok());

    match parsed {
        Some(cfg) if cfg.packages.len() == num_package => cfg
            .packages
            .into_iter()
            .map(|t| LicenseBucketTable {
                enabled: t.enabled,
                buckets: t
                    .buckets
                    .into_iter()
                    .map(|b| Bucket {
                        max_hp_cores: b.max_hp_cores,
                        sse_hz: b.sse_hz,
                        avx2_hz: b.avx2_hz,
                        avx512_hz: b.avx512_hz,
                    })
                    .collect(),
                all_core_turbo_hz: t.all_core_turbo_hz,
                lp_sse_hz: t.lp_sse_hz,
                lp_avx2_hz: t.lp_avx2_hz,
                lp_avx512_hz: t.lp_avx512_hz,
            })
            .collect(),
        _ => {
            warn!(profile, num_package, "SST-TF bucket config missing or malformed, falling back to TRL-equivalent tables");
            disabled_tables(num_package, sticker_hz)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_falls_back_to_disabled() {
        let tables = load_or_fallback("", 2, 2.0e9);
        assert_eq!(tables.len(), 2);
        assert!(!tables[0].enabled);
        assert_eq!(tables[0].all_core_turbo_hz, 2.0e9);
    }

    #[test]
    fn missing_file_falls_back_to_disabled() {
        let tables = load_or_fallback("/nonexistent/path/sst.json", 1, 2.0e9);
        assert_eq!(tables.len(), 1);
        assert!(!tables[0].enabled);
    }
}
