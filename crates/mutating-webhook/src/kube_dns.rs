use std::future::Future;

use admission_mutators::{
    dns_lookup::{local_ip_from_args, DnsLookup, DnsResolution},
    errors::DnsLookupError,
};
use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Service};
use kube::{Api, Client};
use tracing::debug;

use crate::config::DnsLookupConfig;

/// Finds the resolvers to hand to Pods by reading cluster objects:
/// the `-localip` argument of the node-local DNS DaemonSet, and the
/// ClusterIP of the cluster DNS Service.
///
/// Nothing is cached, every admission request performs both lookups.
pub struct KubeDnsLookup {
    client: Client,
    config: DnsLookupConfig,
}

impl KubeDnsLookup {
    pub fn new(client: Client, config: DnsLookupConfig) -> Self {
        Self { client, config }
    }

    async fn node_local_dns(&self) -> Result<String, DnsLookupError> {
        let namespace = &self.config.node_local_dns_namespace;
        let name = &self.config.node_local_dns_name;
        let resource = format!("daemonset {namespace}/{name}");

        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let daemon_set = self
            .bounded(&resource, api.get_opt(name))
            .await?
            .ok_or_else(|| DnsLookupError::NotFound(resource.clone()))?;

        daemon_set
            .spec
            .and_then(|spec| spec.template.spec)
            .into_iter()
            .flat_map(|pod_spec| pod_spec.containers)
            .find_map(|container| local_ip_from_args(&container.args.unwrap_or_default()))
            .ok_or(DnsLookupError::MissingLocalIp(resource))
    }

    async fn cluster_dns(&self) -> Result<String, DnsLookupError> {
        let namespace = &self.config.cluster_dns_namespace;
        let name = &self.config.cluster_dns_service;
        let resource = format!("service {namespace}/{name}");

        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = self
            .bounded(&resource, api.get_opt(name))
            .await?
            .ok_or_else(|| DnsLookupError::NotFound(resource.clone()))?;

        service
            .spec
            .and_then(|spec| spec.cluster_ip)
            // headless services report "None"
            .filter(|cluster_ip| !cluster_ip.is_empty() && cluster_ip != "None")
            .ok_or(DnsLookupError::MissingClusterIp(resource))
    }

    async fn bounded<T>(
        &self,
        resource: &str,
        request: impl Future<Output = kube::Result<T>>,
    ) -> Result<T, DnsLookupError> {
        match tokio::time::timeout(self.config.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DnsLookupError::Api {
                resource: resource.to_owned(),
                message: e.to_string(),
            }),
            Err(_) => Err(DnsLookupError::Timeout(resource.to_owned())),
        }
    }
}

#[async_trait]
impl DnsLookup for KubeDnsLookup {
    async fn resolve(&self) -> DnsResolution {
        let (local, cluster) = tokio::join!(self.node_local_dns(), self.cluster_dns());
        debug!(?local, ?cluster, "resolved DNS endpoints");
        DnsResolution { local, cluster }
    }
}
