// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Class-of-service map agent: assigns per-core CLOS from a table of observed region
//! hashes, plus an optional uncore frequency override.

use hwio::{HardwareIo, MsrDescriptionTable};
use runtime::{Agent, Result, RtdError};

use crate::platform;
use crate::region::RegionProvider;

struct HashEntry {
    hash: f64,
    clos: u64,
}

pub struct ClosMapAgent {
    period_seconds: f64,
    profile: String,
    metric_names: Vec<String>,
    hwio: HardwareIo,
    region_provider: Box<dyn RegionProvider>,
    table: Vec<HashEntry>,
    default_clos: u64,
    uncore_freq_hz: f64,
    clos_write_slots: Vec<usize>,
    clos_shape: platform::FieldShape,
    uncore_write_slot: Option<usize>,
    uncore_shape: platform::FieldShape,
    uncore_cpu: u32,
    uncore_offset: Option<u64>,
    saved_uncore_value: Option<u64>,
}

/// Parses `[default_clos, uncore_freq, hash1, clos1, hash2, clos2, ...]`. Rejects a
/// duplicate hash (by bit pattern) and a NaN hash paired with a non-NaN CLOS.
fn parse_table(params: &[f64]) -> Result<(u64, f64, Vec<HashEntry>)> {
    if params.len() < 2 {
        return Err(RtdError::invalid("clos_map policy requires at least [default_clos, uncore_freq]"));
    }
    let default_clos = params[0] as u64;
    let uncore_freq_hz = params[1];

    let pairs = &params[2..];
    if pairs.len() % 2 != 0 {
        return Err(RtdError::invalid("clos_map hash/clos pairs must come in twos"));
    }

    let mut table = Vec::with_capacity(pairs.len() / 2);
    let mut seen_bits = Vec::new();
    for chunk in pairs.chunks_exact(2) {
        let hash = chunk[0];
        let clos = chunk[1];
        if hash.is_nan() && !clos.is_nan() {
            return Err(RtdError::invalid("clos_map entry has NaN hash with non-NaN clos"));
        }
        let bits = hash.to_bits();
        if seen_bits.contains(&bits) {
            return Err(RtdError::invalid(format!("clos_map has a duplicate hash entry: {hash}")));
        }
        seen_bits.push(bits);
        table.push(HashEntry { hash, clos: clos as u64 });
    }

    Ok((default_clos, uncore_freq_hz, table))
}

impl ClosMapAgent {
    pub fn new(
        period_seconds: f64,
        profile: String,
        params: &[f64],
        cpus: &[u32],
        mut hwio: HardwareIo,
        desc: &MsrDescriptionTable,
        region_provider: Box<dyn RegionProvider>,
    ) -> Result<Self> {
        let (default_clos, uncore_freq_hz, table) = parse_table(params)?;

        let clos_offset = platform::require_offset(desc, platform::PQR_ASSOC, "clos_map")?;
        let clos_shape = platform::field_shape(desc, platform::PQR_ASSOC, platform::CLOS_FIELD);
        let clos_write_slots = cpus
            .iter()
            .map(|&cpu| hwio.add_write(cpu, clos_offset))
            .collect::<Result<Vec<_>>>()?;

        let uncore_offset = platform::offset(desc, platform::UNCORE_RATIO_LIMIT);
        let uncore_shape = platform::field_shape(desc, platform::UNCORE_RATIO_LIMIT, platform::RATIO_FIELD);
        let uncore_write_slot = uncore_offset
            .map(|offset| hwio.add_write(cpus[0], offset))
            .transpose()?;

        Ok(ClosMapAgent {
            period_seconds,
            profile,
            metric_names: vec!["cores-mapped".to_string()],
            hwio,
            region_provider,
            table,
            default_clos,
            uncore_freq_hz,
            clos_write_slots,
            clos_shape,
            uncore_write_slot,
            uncore_shape,
            uncore_cpu: cpus[0],
            uncore_offset,
            saved_uncore_value: None,
        })
    }

    fn clos_for(&self, hash: f64) -> u64 {
        self.table
            .iter()
            .find(|entry| entry.hash.to_bits() == hash.to_bits())
            .map_or(self.default_clos, |entry| entry.clos)
    }
}

impl Agent for ClosMapAgent {
    fn name(&self) -> &str {
        "clos_map"
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
        let mut mapped = 0.0;
        for (core, &slot) in self.clos_write_slots.iter().enumerate() {
            let sample = self.region_provider.sample(core);
            let clos = self.clos_for(sample.hash);
            let (value, mask) = self.clos_shape.pack(clos);
            self.hwio.adjust(slot, value, mask)?;
            mapped += 1.0;
        }

        if let Some(slot) = self.uncore_write_slot {
            if self.uncore_freq_hz.is_nan() {
                if let Some(saved) = self.saved_uncore_value {
                    // Restoring the whole register as originally read, not just this field.
                    self.hwio.adjust(slot, saved, u64::MAX)?;
                }
            } else {
                if self.saved_uncore_value.is_none() {
                    if let Some(offset) = self.uncore_offset {
                        self.saved_uncore_value = Some(self.hwio.read(self.uncore_cpu, offset).unwrap_or(0));
                    }
                }
                let (value, mask) = self.uncore_shape.pack(self.uncore_freq_hz as u64);
                self.hwio.adjust(slot, value, mask)?;
            }
        }

        self.hwio.write_batch()?;
        Ok(vec![mapped])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_hash() {
        let params = [0.0, f64::NAN, 1.0, 2.0, 1.0, 3.0];
        assert!(parse_table(&params).is_err());
    }

    #[test]
    fn rejects_nan_hash_with_non_nan_clos() {
        let params = [0.0, f64::NAN, f64::NAN, 2.0];
        assert!(parse_table(&params).is_err());
    }

    #[test]
    fn parses_well_formed_table() {
        let params = [0.0, f64::NAN, 1.0, 2.0, 3.0, 4.0];
        let (default_clos, uncore, table) = parse_table(&params).unwrap();
        assert_eq!(default_clos, 0);
        assert!(uncore.is_nan());
        assert_eq!(table.len(), 2);
    }
}
