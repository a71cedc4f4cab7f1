// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Symbolic MSR names and platform defaults shared by every agent built on top of
//! [`HardwareIo`]. The description table is an opaque pass-through (per the design's
//! out-of-scope note on the JSON MSR description): these are simply the symbolic names the
//! agents expect it to resolve, matched by the standard Linux `msr-safe`/`libmsr`-style
//! naming the teacher's `hardware` crate uses for its own register tables.

use hwio::MsrDescriptionTable;
use runtime::{Result, RtdError};

pub const PKG_ENERGY_STATUS: &str = "MSR_PKG_ENERGY_STATUS";
pub const DRAM_ENERGY_STATUS: &str = "MSR_DRAM_ENERGY_STATUS";
pub const PKG_POWER_LIMIT: &str = "MSR_PKG_POWER_LIMIT";
pub const PKG_POWER_INFO: &str = "MSR_PKG_POWER_INFO";
pub const PERF_STATUS: &str = "IA32_PERF_STATUS";
pub const PERF_CTL: &str = "IA32_PERF_CTL";
pub const PQR_ASSOC: &str = "IA32_PQR_ASSOC";
pub const UNCORE_RATIO_LIMIT: &str = "MSR_UNCORE_RATIO_LIMIT";

pub const ENERGY_FIELD: &str = "ENERGY";
pub const FREQ_FIELD: &str = "FREQ";
pub const POWER_LIMIT_FIELD: &str = "POWER_LIMIT";
pub const THERMAL_SPEC_FIELD: &str = "THERMAL_SPEC_POWER";
pub const MIN_POWER_FIELD: &str = "MIN_POWER";
pub const MAX_POWER_FIELD: &str = "MAX_POWER";
pub const CLOS_FIELD: &str = "CLOS";
pub const RATIO_FIELD: &str = "RATIO";

/// Used when the description table has no entry for `PKG_POWER_INFO`: a generically safe
/// server-class range so the power-cap agent can still construct and converge.
pub const DEFAULT_MIN_POWER_W: f64 = 0.0;
pub const DEFAULT_MAX_POWER_W: f64 = 500.0;
pub const DEFAULT_TDP_W: f64 = 150.0;
pub const DEFAULT_STICKER_HZ: f64 = 2.0e9;
pub const DEFAULT_MIN_HZ: f64 = 1.0e9;
pub const DEFAULT_MAX_HZ: f64 = 3.5e9;

/// Class-of-service priority split used by the SST-TF model: HP cores are CLOS 0..=MEDIUM_HIGH.
pub const CLOS_MEDIUM_HIGH: u64 = 1;
pub const CLOS_HIGH_PRIORITY: u64 = 0;
pub const CLOS_LOW_PRIORITY: u64 = 3;

pub fn offset(desc: &MsrDescriptionTable, name: &str) -> Option<u64> {
    desc.offset_of(name).ok()
}

/// Resolves `name`, failing `AgentUnsupported` (not `Invalid`): a missing control is a
/// platform capability gap, not a caller mistake.
pub fn require_offset(desc: &MsrDescriptionTable, name: &str, agent: &str) -> Result<u64> {
    desc.offset_of(name).map_err(|_| {
        RtdError::AgentUnsupported(format!(
            "{agent} requires MSR '{name}', which is not present in the loaded description table"
        ))
    })
}

pub fn field_scalar(desc: &MsrDescriptionTable, msr_name: &str, field_name: &str) -> f64 {
    desc.field(msr_name, field_name).map(|f| f.scalar).unwrap_or(1.0)
}

/// A field's bit position, resolved once at agent construction so per-tick writes don't
/// need to hold onto the description table: `(begin_bit, unshifted width mask)`. Falls back
/// to `(0, u64::MAX)` when the field isn't present, so a missing field degrades to "the
/// whole register" rather than panicking.
#[derive(Debug, Clone, Copy)]
pub struct FieldShape {
    shift: u32,
    width_mask: u64,
}

pub fn field_shape(desc: &MsrDescriptionTable, msr_name: &str, field_name: &str) -> FieldShape {
    match desc.field(msr_name, field_name) {
        Ok(f) => {
            let width = (f.end_bit - f.begin_bit + 1).min(64);
            let width_mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            FieldShape {
                shift: f.begin_bit,
                width_mask,
            }
        }
        Err(_) => FieldShape {
            shift: 0,
            width_mask: u64::MAX,
        },
    }
}

impl FieldShape {
    /// Packs `raw` (already scaled to the field's integer unit count) into `(value, mask)`
    /// positioned at this field's bits, so `HardwareIo::adjust` only ever touches the bits
    /// the field actually owns.
    pub fn pack(&self, raw: u64) -> (u64, u64) {
        ((raw & self.width_mask) << self.shift, self.width_mask << self.shift)
    }
}
