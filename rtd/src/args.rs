// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

pub(crate) use clap::Parser;
use rpc::GrpcAddress;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rtd")]
#[command(version = "1.0")]
#[command(about = "Node-local power- and frequency-governance runtime", long_about = None)]
pub(crate) struct CmdArgs {
    /// gRPC server address (IP:PORT for TCP or path for UNIX socket)
    #[arg(
        long,
        value_name = "ADDRESS",
        default_value = "[::1]:50051",
        help = "IP address and port, or UNIX socket path, to listen for management connections"
    )]
    grpc_address: String,

    /// Treat grpc-address as a UNIX socket path
    #[arg(long, help = "Use a unix socket to listen for management connections")]
    grpc_unix_socket: bool,

    #[arg(
        long,
        value_name = "PATH",
        default_value = "/etc/rtd/msr-description.json",
        help = "Path to the JSON MSR description table"
    )]
    msr_description: PathBuf,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        help = "tracing-subscriber filter string, e.g. info or rtd=debug,hwio=trace"
    )]
    log_level: String,

    #[arg(
        long,
        help = "Use an in-memory hardware backend instead of real MSR devices"
    )]
    fake_hardware: bool,
}

impl CmdArgs {
    /// Get the gRPC server address configuration.
    pub fn get_grpc_address(&self) -> Result<GrpcAddress, String> {
        if self.grpc_unix_socket {
            let grpc_path = PathBuf::from(&self.grpc_address);
            if !grpc_path.is_absolute() {
                return Err(format!(
                    "Invalid configuration: --grpc-unix-socket flag is set, but --grpc-address '{}' is not a valid absolute UNIX socket path",
                    self.grpc_address
                ));
            }
            return Ok(GrpcAddress::UnixSocket(grpc_path));
        }

        match self.grpc_address.parse::<SocketAddr>() {
            Ok(addr) => Ok(GrpcAddress::Tcp(addr)),
            Err(e) => Err(format!(
                "Invalid gRPC TCP address '{}': {e}",
                self.grpc_address
            )),
        }
    }

    pub fn msr_description(&self) -> &PathBuf {
        &self.msr_description
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn fake_hardware(&self) -> bool {
        self.fake_hardware
    }
}
