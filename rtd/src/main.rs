// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

mod args;

use std::sync::Arc;

use agents::{AgentContext, Factory};
use hwio::{MsrDescriptionTable, Topology};
use rpc::{ChildHostRegistry, RtdServiceImpl};
use runtime::{run_loop, Policy, SharedState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{CmdArgs, Parser};

fn init_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::new(log_level))
        .init();
}

/// Builds the CPU set and package topology the loop and agents are constructed against.
/// `--fake-hardware` bypasses the `hwloc` probe with a small synthetic two-package layout,
/// since a CI runner or a laptop rarely has per-CPU MSR access to exercise against anyway.
fn build_topology(fake_hardware: bool) -> runtime::Result<Topology> {
    if fake_hardware {
        Ok(Topology::from_package_of_core(vec![0, 0, 1, 1]))
    } else {
        Topology::probe()
    }
}

/// Loads the JSON MSR description table from `path`. A `--fake-hardware` run falls back to
/// an empty table (every symbolic name then resolves as `AgentUnsupported`) rather than
/// refusing to start, so the daemon is still useful for exercising the loop/RPC plumbing
/// without a real description file on hand.
fn load_description(path: &std::path::Path, fake_hardware: bool) -> runtime::Result<MsrDescriptionTable> {
    match MsrDescriptionTable::load(path) {
        Ok(table) => Ok(table),
        Err(e) if fake_hardware => {
            warn!(error = %e, path = %path.display(), "no MSR description table available, falling back to an empty table for --fake-hardware");
            Ok(MsrDescriptionTable::default())
        }
        Err(e) => Err(e),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CmdArgs::parse();
    init_logging(args.log_level());
    info!("starting rtd");

    let grpc_addr = args.get_grpc_address().map_err(|e| {
        error!("invalid gRPC address configuration: {e}");
        e
    })?;

    let description = load_description(args.msr_description(), args.fake_hardware())?;
    let topology = build_topology(args.fake_hardware())?;
    let cpus: Vec<u32> = (0..topology.num_core() as u32).collect();

    let context = AgentContext {
        cpus,
        topology,
        description: Arc::new(description),
        fake_hardware: args.fake_hardware(),
    };

    let shared = SharedState::new(Policy::default());

    let loop_shared = shared.clone();
    std::thread::Builder::new()
        .name("rtd-sampling-loop".to_string())
        .spawn(move || run_loop(loop_shared, Factory::new(context)))
        .map_err(|e| format!("failed to spawn sampling/control loop thread: {e}"))?;

    let tokio_rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_rt.block_on(async move {
        let child_hosts = Arc::new(ChildHostRegistry::new());
        let service = RtdServiceImpl::new(shared, child_hosts);

        tokio::select! {
            result = rpc::serve(grpc_addr, service) => {
                if let Err(e) = result {
                    error!(error = %e, "gRPC server exited with an error");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
            }
        }
    });

    Ok(())
}
