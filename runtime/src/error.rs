// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds shared by every layer of the runtime, independent of transport.

use std::io;

/// Unified error type for the sampling/control loop, the hardware I/O layer, and the RPC
/// service. Mirrors the error kinds of the node runtime's original design: argument-level
/// validation failures are kept distinct from I/O failures so callers can decide whether a
/// retry is ever sensible (it is not, for I/O failures inside the loop).
#[derive(Debug, thiserror::Error)]
pub enum RtdError {
    /// Argument-level policy or batch violation: bad mask, bad index, wrong sample length,
    /// malformed policy.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// A reserved surface that is declared but not yet implemented (higher statistical
    /// moments, some stream ops).
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Failed to open an MSR (or batch) file handle.
    #[error("failed to open MSR handle for cpu {cpu}: {source}")]
    MsrOpen { cpu: u32, source: io::Error },

    /// A batched or direct MSR read failed or returned a short transfer.
    #[error("MSR read failed for cpu {cpu} offset {offset:#x}: {source}")]
    MsrRead {
        cpu: u32,
        offset: u64,
        source: io::Error,
    },

    /// A batched or direct MSR write (read-modify-write) failed or returned a short transfer.
    #[error("MSR write failed for cpu {cpu} offset {offset:#x}: {source}")]
    MsrWrite {
        cpu: u32,
        offset: u64,
        source: io::Error,
    },

    /// Internal invariant failure: null shared state, handshake misuse, a call made out of
    /// the order the protocol requires.
    #[error("runtime invariant violated: {0}")]
    Runtime(String),

    /// The platform lacks a control a requested agent requires (e.g. no package power
    /// control on this SKU).
    #[error("agent unsupported on this platform: {0}")]
    AgentUnsupported(String),
}

impl RtdError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RtdError::Invalid(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        RtdError::Runtime(msg.into())
    }

    /// Best-effort mapping of the underlying OS error to the `errno` crate's typed
    /// `ErrorCode`, for callers that want to branch on the specific errno rather than just
    /// the I/O message.
    pub fn errno_code(&self) -> Option<errno::ErrorCode> {
        let source = match self {
            RtdError::MsrOpen { source, .. }
            | RtdError::MsrRead { source, .. }
            | RtdError::MsrWrite { source, .. } => source,
            _ => return None,
        };
        source.raw_os_error().map(errno::ErrorCode::parse_i32)
    }
}

pub type Result<T> = std::result::Result<T, RtdError>;
