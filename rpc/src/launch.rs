// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Binds the gRPC server to either a TCP address or a UNIX domain socket, mirroring the
//! teacher's dedicated-thread-plus-Tonic-server launch shape.

use std::fmt::Display;
use std::io::Error;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::net::UnixListener;
use tokio_stream::Stream;
use tonic::transport::Server;
use tracing::{debug, error, info, warn};

use crate::proto::rtd_service_server::RtdServiceServer;
use crate::RtdServiceImpl;

/// Either a TCP socket address or a UNIX socket path, as accepted by `--grpc-address` /
/// `--grpc-unix-socket`.
#[derive(Debug, Clone)]
pub enum GrpcAddress {
    Tcp(SocketAddr),
    UnixSocket(PathBuf),
}

impl Display for GrpcAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrpcAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
            GrpcAddress::UnixSocket(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Wraps a `UnixListener` so it can be handed to `Server::serve_with_incoming`.
struct UnixAcceptor {
    listener: UnixListener,
}

impl Stream for UnixAcceptor {
    type Item = Result<tokio::net::UnixStream, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = unsafe { self.get_unchecked_mut() };
        match this.listener.poll_accept(cx) {
            Poll::Ready(Ok((stream, addr))) => {
                debug!("accepted connection on gRPC unix socket from {addr:?}");
                Poll::Ready(Some(Ok(stream)))
            }
            Poll::Ready(Err(e)) => {
                warn!("error accepting connection on gRPC unix socket: {e}");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Starts the gRPC server bound to a TCP address. Runs until the server future resolves,
/// which in practice means until the process is signalled to shut down.
pub async fn serve_tcp(addr: SocketAddr, service: RtdServiceImpl) -> Result<(), Error> {
    info!("starting gRPC server on TCP address: {addr}");
    Server::builder()
        .add_service(RtdServiceServer::new(service))
        .serve(addr)
        .await
        .map_err(|e| {
            error!("failed to start gRPC server: {e}");
            Error::other(e.to_string())
        })
}

/// Starts the gRPC server bound to a UNIX domain socket, creating the parent directory and
/// clearing a stale socket file if one is left over from a previous run.
pub async fn serve_unix(socket_path: &Path, service: RtdServiceImpl) -> Result<(), Error> {
    info!("starting gRPC server on UNIX socket: {}", socket_path.display());

    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("failed to remove existing socket file: {e}");
        }
    }

    if let Some(parent) = socket_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("failed to create parent directory for gRPC socket: {e}");
                e
            })?;
        }
    }

    let listener = UnixListener::bind(socket_path).map_err(|e| {
        error!("failed to bind UNIX socket: {e}");
        e
    })?;
    debug!("bound unix socket to {}", socket_path.display());

    if let Err(e) = std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666)) {
        error!("failed to set socket permissions: {e}");
    }

    let acceptor = UnixAcceptor { listener };
    let result = Server::builder()
        .add_service(RtdServiceServer::new(service))
        .serve_with_incoming(acceptor)
        .await
        .map_err(|e| {
            error!("failed to start gRPC server: {e}");
            Error::other(e.to_string())
        });

    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            error!("failed to remove socket file: {e}");
        }
    }

    result
}

/// Dispatches to [`serve_tcp`] or [`serve_unix`] based on the address variant.
pub async fn serve(addr: GrpcAddress, service: RtdServiceImpl) -> Result<(), Error> {
    match addr {
        GrpcAddress::Tcp(tcp_addr) => serve_tcp(tcp_addr, service).await,
        GrpcAddress::UnixSocket(path) => serve_unix(&path, service).await,
    }
}
