// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `HardwareIo`: the batched MSR read/read-modify-write layer every agent actuates through.
//!
//! Owns per-slot bookkeeping (`add_read`/`add_write`/`adjust`/`sample`) on top of one of the
//! two [`backend`] strategies; the backend only ever sees resolved `(cpu, offset, ...)`
//! tuples, never the slot table.

mod backend;
mod description;
mod msr;
mod topology;

pub use backend::{FakeBackend, MsrBackend};
pub use description::{FieldDescription, MsrDescription, MsrDescriptionTable};
pub use topology::Topology;

use std::collections::HashMap;

use runtime::{Result, RtdError};
use tracing::warn;

use backend::{IoctlBackend, SubmittedIoBackend};

struct ReadOp {
    cpu: u32,
    offset: u64,
    value: u64,
}

struct WriteOp {
    cpu: u32,
    offset: u64,
    wmask_sys: u64,
    pending_value: u64,
    pending_mask: u64,
}

/// Per-CPU MSR file handles plus the optional batch-ioctl endpoint, exposed as a slot-based
/// batching API. One `HardwareIo` is owned exclusively by the agent that constructed it; it
/// is never shared across threads.
pub struct HardwareIo {
    backend: Box<dyn MsrBackend>,
    reads: Vec<ReadOp>,
    read_index: HashMap<(u32, u64), usize>,
    writes: Vec<WriteOp>,
    write_index: HashMap<(u32, u64), usize>,
    have_read: bool,
}

impl HardwareIo {
    /// Opens real MSR device handles for `cpus`, preferring the batch ioctl backend and
    /// demoting to the submitted-I/O backend if the batch device can't be opened.
    pub fn open(cpus: &[u32]) -> Result<Self> {
        let backend: Box<dyn MsrBackend> = match IoctlBackend::open(cpus) {
            Ok(b) => Box::new(b),
            Err(e) => {
                warn!(error = %e, "batch MSR ioctl endpoint unavailable, demoting backend");
                Box::new(SubmittedIoBackend::open(cpus)?)
            }
        };
        Ok(Self::with_backend(backend))
    }

    /// An in-memory register file, used by `--fake-hardware` runs and by tests.
    pub fn fake() -> Self {
        Self::with_backend(Box::new(FakeBackend::new()))
    }

    /// Builds a `HardwareIo` directly on top of a caller-configured [`FakeBackend`], so tests
    /// can pre-seed write masks before exercising `add_write`/`adjust`.
    pub fn with_fake_backend(fake: FakeBackend) -> Self {
        Self::with_backend(Box::new(fake))
    }

    fn with_backend(backend: Box<dyn MsrBackend>) -> Self {
        HardwareIo {
            backend,
            reads: Vec::new(),
            read_index: HashMap::new(),
            writes: Vec::new(),
            write_index: HashMap::new(),
            have_read: false,
        }
    }

    /// Direct, non-batched read.
    pub fn read(&mut self, cpu: u32, offset: u64) -> Result<u64> {
        let values = self.backend.read_batch(&[(cpu, offset)])?;
        Ok(values[0])
    }

    /// Direct, non-batched read-modify-write. Rejects `(value & !mask) != 0` as `Invalid`.
    pub fn write(&mut self, cpu: u32, offset: u64, value: u64, mask: u64) -> Result<()> {
        if value & !mask != 0 {
            return Err(RtdError::invalid(
                "write value sets bits outside its own mask",
            ));
        }
        self.backend.write_batch(&[(cpu, offset, mask, value)])
    }

    /// Queries (and caches) the system-allowed write mask for `offset`.
    pub fn system_write_mask(&mut self, offset: u64) -> Result<u64> {
        self.backend.system_write_mask(offset)
    }

    /// Registers a read op, returning its stable slot. Reads are not deduplicated: a caller
    /// that registers the same `(cpu, offset)` twice gets two independent slots, matching the
    /// one-result-cell-per-registration contract `sample` relies on.
    pub fn add_read(&mut self, cpu: u32, offset: u64) -> usize {
        let slot = self.reads.len();
        self.reads.push(ReadOp {
            cpu,
            offset,
            value: 0,
        });
        self.read_index.insert((cpu, offset), slot);
        slot
    }

    /// Registers a write op, deduplicating by `(cpu, offset)`: a repeated registration
    /// returns the existing slot rather than a new one, since there is only ever one pending
    /// value/mask per MSR field location. Records the *system* write mask at add time.
    pub fn add_write(&mut self, cpu: u32, offset: u64) -> Result<usize> {
        if let Some(&slot) = self.write_index.get(&(cpu, offset)) {
            return Ok(slot);
        }
        let wmask_sys = self.backend.system_write_mask(offset)?;
        let slot = self.writes.len();
        self.writes.push(WriteOp {
            cpu,
            offset,
            wmask_sys,
            pending_value: 0,
            pending_mask: 0,
        });
        self.write_index.insert((cpu, offset), slot);
        Ok(slot)
    }

    /// Merges `value`/`mask` into the write op's pending state. Bits in `mask` outside the
    /// op's system write mask, or set bits in `value` outside `mask`, fail `Invalid` without
    /// mutating any pending state. Overlapping `adjust` calls between `write_batch`es use
    /// last-writer-wins semantics per bit position.
    pub fn adjust(&mut self, slot: usize, value: u64, mask: u64) -> Result<()> {
        let op = self
            .writes
            .get_mut(slot)
            .ok_or_else(|| RtdError::invalid(format!("invalid write slot {slot}")))?;
        if mask & !op.wmask_sys != 0 {
            return Err(RtdError::invalid(
                "adjust mask sets bits outside the system write mask",
            ));
        }
        if value & !mask != 0 {
            return Err(RtdError::invalid(
                "adjust value sets bits outside its own mask",
            ));
        }
        op.pending_value = (op.pending_value & !mask) | value;
        op.pending_mask |= mask;
        Ok(())
    }

    /// Executes all registered read ops in one backend call, populating each slot's result.
    pub fn read_batch(&mut self) -> Result<()> {
        if !self.reads.is_empty() {
            let ops: Vec<(u32, u64)> = self.reads.iter().map(|r| (r.cpu, r.offset)).collect();
            let values = self.backend.read_batch(&ops)?;
            for (op, value) in self.reads.iter_mut().zip(values) {
                op.value = value;
            }
        }
        self.have_read = true;
        Ok(())
    }

    /// Flushes every registered write op as an atomic read-modify-write, then clears pending
    /// value/mask on success.
    pub fn write_batch(&mut self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let ops: Vec<(u32, u64, u64, u64)> = self
            .writes
            .iter()
            .map(|w| (w.cpu, w.offset, w.pending_mask, w.pending_value))
            .collect();
        self.backend.write_batch(&ops)?;
        for op in &mut self.writes {
            op.pending_value = 0;
            op.pending_mask = 0;
        }
        Ok(())
    }

    /// The value read for `slot` by the most recent `read_batch`. `Invalid` if `read_batch`
    /// has not yet run.
    pub fn sample(&self, slot: usize) -> Result<u64> {
        if !self.have_read {
            return Err(RtdError::invalid("read_batch has not been run yet"));
        }
        self.reads
            .get(slot)
            .map(|r| r.value)
            .ok_or_else(|| RtdError::invalid(format!("invalid read slot {slot}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_batch_then_sample_round_trips() {
        let mut hw = HardwareIo::fake();
        hw.write(0, 0x10, 0x5, 0xF).unwrap();
        let slot = hw.add_read(0, 0x10);
        hw.read_batch().unwrap();
        assert_eq!(hw.sample(slot).unwrap(), 0x5);
    }

    #[test]
    fn sample_before_read_batch_is_invalid() {
        let mut hw = HardwareIo::fake();
        let slot = hw.add_read(0, 0x10);
        assert!(hw.sample(slot).is_err());
    }

    // S5: mask safety.
    #[test]
    fn s5_adjust_respects_system_write_mask() {
        let mut fake = FakeBackend::new();
        fake.set_write_mask(0x20, 0xFF);
        let mut hw = HardwareIo::with_fake_backend(fake);
        let slot = hw.add_write(0, 0x20).unwrap();
        hw.adjust(slot, 0x10, 0x30).unwrap();
        hw.write_batch().unwrap();

        assert!(hw.adjust(slot, 0x100, 0x100).is_err());
    }

    #[test]
    fn add_write_deduplicates_by_cpu_and_offset() {
        let mut hw = HardwareIo::fake();
        let a = hw.add_write(1, 0x30).unwrap();
        let b = hw.add_write(1, 0x30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn write_batch_preserves_bits_outside_mask() {
        let mut hw = HardwareIo::fake();
        hw.write(2, 0x40, 0xFF, 0xFF).unwrap();
        let slot = hw.add_write(2, 0x40).unwrap();
        hw.adjust(slot, 0x00, 0x0F).unwrap();
        hw.write_batch().unwrap();
        assert_eq!(hw.read(2, 0x40).unwrap(), 0xF0);
    }
}
