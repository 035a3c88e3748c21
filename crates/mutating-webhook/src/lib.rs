pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod kube_dns;
pub mod kube_events;
pub mod metrics;
pub mod tracing;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ::tracing::{info, warn};
use admission_mutators::{
    dns_lookup::{DnsLookup, UnavailableDnsLookup},
    events::EventRecorder,
    mutators::{CpuOversell, DnsConfig},
    MutationHandler,
};
use anyhow::{anyhow, Result};
use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};

use crate::api::{Endpoint, Route};
use crate::config::Config;
use crate::kube_dns::KubeDnsLookup;
use crate::kube_events::{KubeEventRecorder, LogEventRecorder};

/// The services the mutators rely on.
pub struct Collaborators {
    pub events: Arc<dyn EventRecorder>,
    pub dns: Arc<dyn DnsLookup>,
}

impl Collaborators {
    /// Collaborators backed by the cluster the webhook runs in. Without a
    /// cluster connection, and when allowed to, events are only logged and
    /// DNS lookups always fail.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match kube::Client::try_default().await {
            Ok(client) => Ok(Self {
                events: Arc::new(KubeEventRecorder::new(client.clone())),
                dns: Arc::new(KubeDnsLookup::new(client, config.dns_lookup.clone())),
            }),
            Err(e) if config.ignore_kubernetes_connection_failure => {
                warn!(error = %e, "Cannot connect to Kubernetes, running without a cluster connection");
                Ok(Self::detached())
            }
            Err(e) => Err(anyhow!("Cannot connect to Kubernetes: {e}")),
        }
    }

    pub fn detached() -> Self {
        Self {
            events: Arc::new(LogEventRecorder),
            dns: Arc::new(UnavailableDnsLookup),
        }
    }
}

pub struct MutatingWebhook {
    router: Router,
    addr: SocketAddr,
    tls_config: Option<RustlsConfig>,
    shutdown_grace_period: Duration,
}

impl MutatingWebhook {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config).await?;
        Self::new(config, collaborators).await
    }

    pub async fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let routes = vec![
            Route {
                endpoint: Endpoint::CpuOversell,
                path: config.endpoint_paths.cpu_oversell.clone(),
                handler: Arc::new(MutationHandler::new(CpuOversell::new(
                    collaborators.events.clone(),
                ))),
            },
            Route {
                endpoint: Endpoint::DnsConfig,
                path: config.endpoint_paths.dns_config.clone(),
                handler: Arc::new(MutationHandler::new(DnsConfig::new(
                    config.cluster_domain.clone(),
                    collaborators.dns,
                    collaborators.events,
                ))),
            },
        ];
        let router = api::router(routes);

        let tls_config = match &config.tls_config {
            Some(tls_config) => Some(certs::create_tls_config(tls_config).await?),
            None => None,
        };

        Ok(Self {
            router,
            addr: config.addr,
            tls_config,
            shutdown_grace_period: config.shutdown_grace_period,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until SIGINT or SIGTERM, then stop accepting connections and
    /// give in-flight requests the grace period to complete.
    pub async fn run(self) -> Result<()> {
        let handle = Handle::new();
        tokio::spawn(shutdown_on_signal(
            handle.clone(),
            self.shutdown_grace_period,
        ));

        match self.tls_config {
            Some(tls_config) => {
                info!(address = %self.addr, "started HTTPS server");
                axum_server::bind_rustls(self.addr, tls_config)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                info!(address = %self.addr, "started HTTP server");
                axum_server::bind(self.addr)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        info!("server stopped");
        Ok(())
    }
}

async fn shutdown_on_signal(handle: Handle, grace_period: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        grace_period_seconds = grace_period.as_secs(),
        "shutdown signal received, draining in-flight requests"
    );
    handle.graceful_shutdown(Some(grace_period));
}
