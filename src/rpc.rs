// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! gRPC wire front end (`coredns.dns.DnsService/Query`).
//!
//! The CoreDNS `grpc` plugin forwards each query for the configured zone as a
//! `DnsPacket` whose `msg` field holds a wire-format DNS message, and expects a
//! `DnsPacket` back. The server only listens on loopback: `127.0.0.1` is
//! required, `[::1]` is added when the host supports it.

use crate::dns_errors::{PluginError, QueryError};
use crate::query::QueryService;
use crate::store::RecordStore;
use futures::stream;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

/// A wire-format DNS message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DnsPacket {
    /// Encoded DNS message
    #[prost(bytes = "vec", tag = "1")]
    pub msg: Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/coredns.dns.DnsService.rs"));

pub use dns_service_client::DnsServiceClient;
pub use dns_service_server::{DnsService, DnsServiceServer};

/// `DnsService` implementation backed by the record store.
#[derive(Clone, Debug)]
pub struct DnsBackend {
    queries: QueryService,
}

impl DnsBackend {
    /// Create a backend answering from `store`.
    #[must_use]
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            queries: QueryService::new(store),
        }
    }
}

#[tonic::async_trait]
impl DnsService for DnsBackend {
    async fn query(&self, request: Request<DnsPacket>) -> Result<Response<DnsPacket>, Status> {
        let packet = request.into_inner();
        match self.queries.handle(&packet.msg) {
            Ok(msg) => Ok(Response::new(DnsPacket { msg })),
            Err(e @ QueryError::Encode(_)) => {
                error!(error = %e, "Failed to encode DNS response");
                Err(Status::internal(e.to_string()))
            }
            Err(e) => Err(Status::invalid_argument(e.to_string())),
        }
    }
}

/// Bind the loopback listeners for `port`.
///
/// Port `0` picks an ephemeral port on `127.0.0.1` and reuses it for `[::1]`.
///
/// # Errors
///
/// Returns an error if `127.0.0.1` cannot be bound. An IPv6 failure is only
/// logged.
pub async fn bind_loopback(port: u16) -> Result<Vec<TcpListener>, PluginError> {
    let v4_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let v4 = TcpListener::bind(v4_addr)
        .await
        .map_err(|source| PluginError::Bind {
            addr: v4_addr,
            source,
        })?;
    let bound_port = v4.local_addr().map_or(port, |addr| addr.port());

    let mut listeners = vec![v4];
    let v6_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound_port);
    match TcpListener::bind(v6_addr).await {
        Ok(v6) => listeners.push(v6),
        Err(e) => warn!(addr = %v6_addr, error = %e, "IPv6 loopback unavailable; serving IPv4 only"),
    }

    Ok(listeners)
}

/// A running gRPC server.
pub struct RpcServer {
    local_addrs: Vec<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl RpcServer {
    /// Serve `DnsService` on every listener until [`RpcServer::shutdown`].
    #[must_use]
    pub fn serve(listeners: Vec<TcpListener>, store: Arc<RecordStore>) -> Self {
        let local_addrs: Vec<SocketAddr> = listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect();
        let incoming = stream::select_all(listeners.into_iter().map(TcpListenerStream::new));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let service = DnsServiceServer::new(DnsBackend::new(store));
        let task = tokio::spawn(
            Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                }),
        );

        info!(addrs = ?local_addrs, "gRPC DNS backend listening");
        Self {
            local_addrs,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Addresses the server accepts connections on.
    #[must_use]
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stop accepting connections and wait for the server to exit.
    ///
    /// The listening sockets are released when this returns.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match (&mut self.task).await {
            Ok(Ok(())) => debug!("gRPC DNS backend stopped"),
            Ok(Err(e)) => error!(error = %e, "gRPC DNS backend failed"),
            Err(e) => error!(error = %e, "gRPC DNS backend task panicked"),
        }
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod rpc_tests;
