// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Plugin lifecycle: wire the store, the gRPC backend and one watch pipeline per
//! configured resource kind.
//!
//! [`DnsPlugin::start`] returns once every pipeline has applied its pre-fetch
//! and its watch task is running; it never blocks after that.
//! [`DnsPlugin::stop`] ends every watch and releases the listening sockets.

use crate::accessor::ingress::IngressAccessor;
use crate::accessor::service::ServiceAccessor;
use crate::accessor::ResourceAccessor;
use crate::config::PluginConfig;
use crate::constants::{PLUGIN_NAME, STATUS_BOX_DNS};
use crate::dns_errors::PluginError;
use crate::dns_manager::{DnsManager, LoggingDnsManager, StoreDnsManager};
use crate::entry::EntryKind;
use crate::metrics::MetricsServer;
use crate::reconciler::Reconciler;
use crate::rpc::{bind_loopback, RpcServer};
use crate::status::{StatusPublisher, StatusSender};
use crate::store::RecordStore;
use crate::watcher::Watcher;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Type-erased handle to a running watch pipeline.
#[async_trait::async_trait]
trait Pipeline: Send + Sync {
    async fn stop(&self);
}

#[async_trait::async_trait]
impl<H> Pipeline for Watcher<H>
where
    H: Send + 'static,
{
    async fn stop(&self) {
        Watcher::stop(self).await;
    }
}

/// Everything a started plugin owns.
pub(crate) struct PluginRuntime {
    store: Option<Arc<RecordStore>>,
    rpc: Option<RpcServer>,
    metrics: Option<MetricsServer>,
    dns: Arc<dyn DnsManager>,
    status_tx: StatusSender,
    restart_delay: Duration,
    pipelines: Vec<Box<dyn Pipeline>>,
}

impl PluginRuntime {
    /// Start the store, the gRPC backend and the metrics endpoint.
    pub(crate) async fn launch(
        config: &PluginConfig,
        status_tx: StatusSender,
    ) -> Result<Self, PluginError> {
        let (store, rpc, dns) = if config.serve_dns {
            let store = Arc::new(RecordStore::new(config.record_ttl));
            let listeners = bind_loopback(config.listen_port).await?;
            let rpc = RpcServer::serve(listeners, Arc::clone(&store));
            let dns: Arc<dyn DnsManager> = Arc::new(StoreDnsManager::new(Arc::clone(&store)));
            (Some(store), Some(rpc), dns)
        } else {
            info!("DNS serving disabled; reconciling against the logging DNS manager");
            let dns: Arc<dyn DnsManager> = Arc::new(LoggingDnsManager);
            (None, None, dns)
        };

        let metrics = match config.metrics_addr {
            Some(addr) => match MetricsServer::start(addr).await {
                Ok(server) => Some(server),
                Err(e) => {
                    if let Some(rpc) = rpc {
                        rpc.shutdown().await;
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        Ok(Self {
            store,
            rpc,
            metrics,
            dns,
            status_tx,
            restart_delay: config.restart_delay,
            pipelines: Vec::new(),
        })
    }

    /// Pre-fetch through `accessor` and start watching from the list cursor.
    pub(crate) async fn add_pipeline<A: ResourceAccessor>(
        &mut self,
        accessor: Arc<A>,
    ) -> Result<(), PluginError> {
        let kind = accessor.kind();
        let mut reconciler = Reconciler::new(
            Arc::clone(&accessor),
            Arc::clone(&self.dns),
            self.status_tx.clone(),
        );
        let cursor = reconciler
            .pre_fetch()
            .await
            .map_err(|source| PluginError::PreFetch {
                kind: kind.as_str(),
                source,
            })?;

        debug!(kind = %kind, cursor = %cursor, "Starting watch");
        let watcher = Watcher::spawn(accessor, reconciler, cursor, self.restart_delay);
        self.pipelines.push(Box::new(watcher));
        Ok(())
    }

    pub(crate) fn grpc_addrs(&self) -> Vec<SocketAddr> {
        self.rpc
            .as_ref()
            .map(|rpc| rpc.local_addrs().to_vec())
            .unwrap_or_default()
    }

    /// Stop every watch, then the servers.
    pub(crate) async fn shutdown(self) {
        for pipeline in &self.pipelines {
            pipeline.stop().await;
        }
        if let Some(rpc) = self.rpc {
            rpc.shutdown().await;
        }
        if let Some(metrics) = self.metrics {
            metrics.shutdown().await;
        }
    }
}

/// The DNS plugin as seen by the hosting CLI.
pub struct DnsPlugin {
    config: PluginConfig,
    client: Client,
    runtime: Option<PluginRuntime>,
    status: Option<StatusPublisher>,
}

impl DnsPlugin {
    /// Create a stopped plugin.
    #[must_use]
    pub fn new(config: PluginConfig, client: Client) -> Self {
        Self {
            config,
            client,
            runtime: None,
            status: None,
        }
    }

    /// The plugin's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// Establish initial state and start watching.
    ///
    /// Returns the plugin name once every configured kind has been pre-fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin is already running, a socket cannot be
    /// bound, or a pre-fetch fails. Nothing is left running on error.
    pub async fn start(&mut self, status_tx: StatusSender) -> Result<String, PluginError> {
        if self.runtime.is_some() {
            return Err(PluginError::AlreadyStarted);
        }

        let status = StatusPublisher::new(STATUS_BOX_DNS, status_tx.clone());
        let mut runtime = PluginRuntime::launch(&self.config, status_tx).await?;

        for kind in &self.config.watch {
            let added = match kind {
                EntryKind::Ingress => {
                    runtime
                        .add_pipeline(Arc::new(IngressAccessor::new(self.client.clone())))
                        .await
                }
                EntryKind::Service => {
                    runtime
                        .add_pipeline(Arc::new(ServiceAccessor::new(
                            self.client.clone(),
                            self.config.cluster_domain.clone(),
                        )))
                        .await
                }
            };
            if let Err(e) = added {
                runtime.shutdown().await;
                return Err(e);
            }
        }

        let message = started_message(&runtime.grpc_addrs(), &self.config.watch);
        info!("{message}");
        status.publish(message).await;

        self.runtime = Some(runtime);
        self.status = Some(status);
        Ok(PLUGIN_NAME.to_string())
    }

    /// Stop watching and release the listening sockets.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin is not running.
    pub async fn stop(&mut self) -> Result<(), PluginError> {
        let runtime = self.runtime.take().ok_or(PluginError::NotStarted)?;
        runtime.shutdown().await;

        info!("{PLUGIN_NAME} stopped");
        if let Some(status) = self.status.take() {
            status.publish(format!("{PLUGIN_NAME} stopped")).await;
        }
        Ok(())
    }

    /// Whether [`DnsPlugin::start`] has succeeded and [`DnsPlugin::stop`] has not run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// The live record store, when DNS serving is enabled and the plugin runs.
    #[must_use]
    pub fn store(&self) -> Option<Arc<RecordStore>> {
        self.runtime.as_ref().and_then(|runtime| runtime.store.clone())
    }

    /// Addresses of the gRPC backend, empty when not serving.
    #[must_use]
    pub fn grpc_addrs(&self) -> Vec<SocketAddr> {
        self.runtime
            .as_ref()
            .map(PluginRuntime::grpc_addrs)
            .unwrap_or_default()
    }
}

fn started_message(addrs: &[SocketAddr], kinds: &[EntryKind]) -> String {
    let kinds = kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if addrs.is_empty() {
        format!("{PLUGIN_NAME} started (DNS serving disabled); watching {kinds}")
    } else {
        let addrs = addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{PLUGIN_NAME} started on {addrs}; watching {kinds}")
    }
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod plugin_tests;
