// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The gRPC surface of the daemon: policy injection, report retrieval, and the
//! add/remove-child-host tree membership calls, plus the TCP/Unix launch helpers.

mod child_hosts;
mod launch;
mod service;

pub mod proto {
    tonic::include_proto!("rtd");
}

pub use child_hosts::ChildHostRegistry;
pub use launch::{serve, serve_tcp, serve_unix, GrpcAddress};
pub use service::RtdServiceImpl;
