// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loader for the JSON MSR description table. The core treats the table's *contents* as
//! opaque (per the out-of-scope note in the design); only the shape needed to resolve a
//! symbolic field name to `(offset, begin_bit, end_bit)` is modeled here.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use runtime::{Result, RtdError};

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescription {
    pub begin_bit: u32,
    pub end_bit: u32,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default = "default_scalar")]
    pub scalar: f64,
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(default)]
    pub writeable: bool,
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_scalar() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsrDescription {
    pub offset: u64,
    pub domain: String,
    pub fields: HashMap<String, FieldDescription>,
}

/// The full table, keyed by symbolic MSR name (e.g. `"PERF_STATUS"`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MsrDescriptionTable(HashMap<String, MsrDescription>);

impl MsrDescriptionTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RtdError::invalid(format!("cannot read MSR description {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| RtdError::invalid(format!("malformed MSR description {}: {e}", path.display())))
    }

    /// Resolves a symbolic MSR name to its register offset. Unknown names are `Invalid`
    /// errors raised at construction time, never surfaced later as an I/O failure.
    pub fn offset_of(&self, msr_name: &str) -> Result<u64> {
        self.0
            .get(msr_name)
            .map(|d| d.offset)
            .ok_or_else(|| RtdError::invalid(format!("unknown MSR name: {msr_name}")))
    }

    pub fn field(&self, msr_name: &str, field_name: &str) -> Result<&FieldDescription> {
        let msr = self
            .0
            .get(msr_name)
            .ok_or_else(|| RtdError::invalid(format!("unknown MSR name: {msr_name}")))?;
        msr.fields
            .get(field_name)
            .ok_or_else(|| RtdError::invalid(format!("unknown field {field_name} on MSR {msr_name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_offset_and_rejects_unknown_name() {
        let json = r#"{
            "PERF_CTL": {
                "offset": 402,
                "domain": "core",
                "fields": {
                    "FREQ": { "begin_bit": 8, "end_bit": 15, "writeable": true }
                }
            }
        }"#;
        let table: MsrDescriptionTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.offset_of("PERF_CTL").unwrap(), 402);
        assert!(table.offset_of("NO_SUCH_MSR").is_err());
        assert_eq!(table.field("PERF_CTL", "FREQ").unwrap().begin_bit, 8);
    }
}
