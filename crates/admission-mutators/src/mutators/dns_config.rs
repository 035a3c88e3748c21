//! Inject the cluster's resolver settings into the DNS config of pods.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodDNSConfig, PodDNSConfigOption};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::admission_request::AdmissionRequest;
use crate::dns_lookup::{DnsLookup, DnsResolution};
use crate::errors::DnsLookupError;
use crate::events::{controller_reference, object_reference, EventRecorder, EventType};
use crate::handler::{Mutation, Mutator};

/// Resolver options every pod gets, unless it already sets them.
pub const DNS_OPTIONS: [(&str, &str); 2] = [("timeout", "2"), ("ndots", "5")];

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// The API server rejects pods listing more nameservers than this.
pub const MAX_NAMESERVERS: usize = 3;

/// The API server rejects pods listing more search domains than this.
pub const MAX_DNS_SEARCHES: usize = 32;

pub struct DnsConfig {
    cluster_domain: String,
    dns: Arc<dyn DnsLookup>,
    events: Arc<dyn EventRecorder>,
}

impl DnsConfig {
    pub fn new(
        cluster_domain: impl Into<String>,
        dns: Arc<dyn DnsLookup>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        DnsConfig {
            cluster_domain: cluster_domain.into(),
            dns,
            events,
        }
    }
}

/// Search domains, most specific first: the namespace's service domain when
/// the namespace is known, then the cluster-wide service and base domains,
/// then whatever the pod already listed, up to [`MAX_DNS_SEARCHES`].
pub fn search_domains(
    namespace: Option<&str>,
    cluster_domain: &str,
    existing: &[String],
) -> Vec<String> {
    let mut searches = vec![format!("svc.{cluster_domain}"), cluster_domain.to_owned()];
    if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
        let namespace_search = format!("{namespace}.svc.{cluster_domain}");
        if !searches.contains(&namespace_search) {
            searches.insert(0, namespace_search);
        }
    }
    append_missing(&mut searches, existing, MAX_DNS_SEARCHES);
    searches
}

/// Add the default resolver options the pod does not set yet.
pub fn merge_options(options: &mut Vec<PodDNSConfigOption>) {
    for (name, value) in DNS_OPTIONS {
        if options.iter().any(|o| o.name.as_deref() == Some(name)) {
            continue;
        }
        options.push(PodDNSConfigOption {
            name: Some(name.to_owned()),
            value: Some(value.to_owned()),
        });
    }
}

/// Usable nameservers out of a resolution, local resolver first. Failed or
/// invalid lookups are returned separately so they can be reported.
pub fn nameservers(resolution: DnsResolution) -> (Vec<String>, Vec<DnsLookupError>) {
    let mut servers = Vec::new();
    let mut errors = Vec::new();
    for result in [resolution.local, resolution.cluster] {
        match result {
            Ok(address) if address.parse::<IpAddr>().is_ok() => servers.push(address),
            Ok(address) => errors.push(DnsLookupError::InvalidAddress(address)),
            Err(error) => errors.push(error),
        }
    }
    (servers, errors)
}

/// Append the entries of `extra` not yet in `target` while it holds fewer
/// than `limit` entries. Entries already in `target` are never dropped.
fn append_missing(target: &mut Vec<String>, extra: &[String], limit: usize) {
    for item in extra {
        if target.len() >= limit {
            break;
        }
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[async_trait]
impl Mutator for DnsConfig {
    type Resource = Pod;
    const COMPARES_OLD_OBJECT: bool = true;

    async fn mutate(&self, request: &AdmissionRequest, old: Option<&Pod>, pod: &mut Pod) -> Mutation {
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .or_else(|| request.namespace.clone())
            .unwrap_or_default();
        let name = pod
            .metadata
            .name
            .clone()
            .or_else(|| pod.metadata.generate_name.clone())
            .unwrap_or_default();

        if old.is_some_and(|old| old.spec == pod.spec) {
            let note = format!("Ignoring status update for pod {namespace}/{name}");
            self.events
                .record(&object_reference(&*pod), EventType::Normal, "DeepEqual", &note);
            info!(%namespace, %name, "ignoring status update for pod");
            return Mutation::skipped(note);
        }

        let (resolved, failures) = nameservers(self.dns.resolve().await);
        let mut warnings = Vec::new();
        for failure in failures {
            let note = format!("Failed to get DNS IP address: {failure}");
            warn!(%namespace, %name, error = %failure, "failed to get DNS IP address");
            self.events
                .record(&object_reference(&*pod), EventType::Warning, "GetDNSIP", &note);
            warnings.push(note);
        }

        let dns_config = pod
            .spec
            .get_or_insert_with(Default::default)
            .dns_config
            .get_or_insert_with(PodDNSConfig::default);

        merge_options(dns_config.options.get_or_insert_with(Vec::new));

        let searches = search_domains(
            Some(namespace.as_str()),
            &self.cluster_domain,
            dns_config.searches.as_deref().unwrap_or_default(),
        );
        dns_config.searches = Some(searches);

        let mut servers = resolved;
        append_missing(
            &mut servers,
            dns_config.nameservers.as_deref().unwrap_or_default(),
            MAX_NAMESERVERS,
        );
        dns_config.nameservers = if servers.is_empty() {
            None
        } else {
            Some(servers)
        };

        info!(%namespace, %name, "mutated DNS configuration for pod");
        self.events.record(
            &controller_reference(&*pod),
            EventType::Normal,
            "Mutated DNS",
            "Mutated DNS configuration for pod",
        );

        let mut mutation = Mutation::mutated("Mutated DNS configuration for pod");
        mutation.warnings = warnings;
        mutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_request::{GroupVersionResource, Operation};
    use crate::admission_response::AdmissionResponse;
    use crate::events::tests::RecordingEventRecorder;
    use crate::handler::{AdmissionHandler, MutationHandler};
    use base64::{engine::general_purpose, Engine as _};
    use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
    use rstest::rstest;
    use serde_json::{json, Value};

    struct FixedDns(DnsResolution);

    #[async_trait]
    impl DnsLookup for FixedDns {
        async fn resolve(&self) -> DnsResolution {
            self.0.clone()
        }
    }

    fn resolved() -> DnsResolution {
        DnsResolution {
            local: Ok("169.254.20.10".to_string()),
            cluster: Ok("10.96.0.10".to_string()),
        }
    }

    fn pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0",
                "namespace": "billing",
                "ownerReferences": [{
                    "apiVersion": "apps/v1",
                    "kind": "StatefulSet",
                    "name": "web",
                    "uid": "sts-uid",
                    "controller": true
                }]
            },
            "spec": {"containers": [{"name": "web", "image": "nginx"}]},
            "status": {"phase": "Pending"}
        })
    }

    fn request(object: Value, old: Option<Value>) -> AdmissionRequest {
        AdmissionRequest {
            uid: "uid".to_string(),
            resource: GroupVersionResource::of::<Pod>(),
            namespace: Some("billing".to_string()),
            operation: if old.is_some() {
                Operation::Update
            } else {
                Operation::Create
            },
            object: Some(RawExtension(object)),
            old_object: old.map(RawExtension),
            ..Default::default()
        }
    }

    async fn admit(
        req: AdmissionRequest,
        dns: DnsResolution,
    ) -> (AdmissionResponse, Arc<RecordingEventRecorder>) {
        let recorder = Arc::new(RecordingEventRecorder::default());
        let handler = MutationHandler::new(DnsConfig::new(
            DEFAULT_CLUSTER_DOMAIN,
            Arc::new(FixedDns(dns)),
            recorder.clone(),
        ));
        (handler.admit(&req).await, recorder)
    }

    fn apply(mut object: Value, response: &AdmissionResponse) -> Value {
        if let Some(patch) = &response.patch {
            let raw = general_purpose::STANDARD.decode(patch).unwrap();
            let patch: json_patch::Patch = serde_json::from_slice(&raw).unwrap();
            json_patch::patch(&mut object, &patch.0).unwrap();
        }
        object
    }

    #[rstest]
    #[case(Some("billing"), &[], &["billing.svc.cluster.local", "svc.cluster.local", "cluster.local"])]
    #[case(
        Some("billing"),
        &["billing.svc.cluster.local"],
        &["billing.svc.cluster.local", "svc.cluster.local", "cluster.local"]
    )]
    #[case(
        Some("billing"),
        &["corp.example.com"],
        &["billing.svc.cluster.local", "svc.cluster.local", "cluster.local", "corp.example.com"]
    )]
    #[case(None, &[], &["svc.cluster.local", "cluster.local"])]
    #[case(Some(""), &[], &["svc.cluster.local", "cluster.local"])]
    fn search_domain_order(
        #[case] namespace: Option<&str>,
        #[case] existing: &[&str],
        #[case] expected: &[&str],
    ) {
        let existing: Vec<String> = existing.iter().map(|s| s.to_string()).collect();
        assert_eq!(search_domains(namespace, "cluster.local", &existing), expected);
    }

    #[test]
    fn search_list_is_capped() {
        let existing: Vec<String> = (0..40).map(|i| format!("zone{i}.example.com")).collect();
        let searches = search_domains(Some("billing"), "cluster.local", &existing);

        assert_eq!(searches.len(), MAX_DNS_SEARCHES);
        assert_eq!(searches[0], "billing.svc.cluster.local");
        assert_eq!(searches[3], "zone0.example.com");
        assert_eq!(searches[MAX_DNS_SEARCHES - 1], "zone28.example.com");
    }

    #[test]
    fn options_are_not_duplicated() {
        let mut options = vec![PodDNSConfigOption {
            name: Some("ndots".to_string()),
            value: Some("2".to_string()),
        }];
        merge_options(&mut options);
        merge_options(&mut options);

        let names: Vec<_> = options.iter().map(|o| o.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["ndots", "timeout"]);
        assert_eq!(options[0].value.as_deref(), Some("2"));
    }

    #[test]
    fn invalid_addresses_are_skipped() {
        let (servers, errors) = nameservers(DnsResolution {
            local: Ok("not-an-ip".to_string()),
            cluster: Ok("fd00::10".to_string()),
        });

        assert_eq!(servers, vec!["fd00::10"]);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn pod_gets_cluster_dns() {
        let original = pod();
        let (response, recorder) = admit(request(original.clone(), None), resolved()).await;

        assert!(response.allowed);
        assert!(response.warnings.is_none());

        let patched = apply(original, &response);
        let dns_config = &patched["spec"]["dnsConfig"];
        assert_eq!(dns_config["nameservers"], json!(["169.254.20.10", "10.96.0.10"]));
        assert_eq!(
            dns_config["searches"],
            json!(["billing.svc.cluster.local", "svc.cluster.local", "cluster.local"])
        );
        assert_eq!(
            dns_config["options"],
            json!([{"name": "timeout", "value": "2"}, {"name": "ndots", "value": "5"}])
        );

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "Mutated DNS");
        assert_eq!(events[0].object.kind.as_deref(), Some("StatefulSet"));
    }

    #[tokio::test]
    async fn mutation_is_idempotent() {
        let original = pod();
        let (first, _) = admit(request(original.clone(), None), resolved()).await;
        let patched = apply(original, &first);

        let (second, _) = admit(request(patched, None), resolved()).await;

        assert!(second.allowed);
        assert!(second.patch.is_none());
    }

    #[tokio::test]
    async fn status_only_update_is_a_no_op() {
        let old = pod();
        let mut new = pod();
        new["status"]["phase"] = json!("Running");

        let (response, recorder) = admit(request(new, Some(old)), resolved()).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
        assert_eq!(
            recorder.reasons(),
            vec![(EventType::Normal, "DeepEqual".to_string())]
        );
    }

    #[tokio::test]
    async fn spec_update_is_mutated() {
        let old = pod();
        let mut new = pod();
        new["spec"]["containers"][0]["image"] = json!("nginx:1.27");

        let (response, _) = admit(request(new, Some(old)), resolved()).await;

        assert!(response.patch.is_some());
    }

    #[tokio::test]
    async fn lookup_failures_are_not_fatal() {
        let original = pod();
        let dns = DnsResolution {
            local: Err(DnsLookupError::NotFound(
                "daemonset kube-system/node-local-dns".to_string(),
            )),
            cluster: Ok("10.96.0.10".to_string()),
        };

        let (response, recorder) = admit(request(original.clone(), None), dns).await;

        assert!(response.allowed);
        assert_eq!(response.warnings.as_ref().map(Vec::len), Some(1));

        let patched = apply(original, &response);
        assert_eq!(patched["spec"]["dnsConfig"]["nameservers"], json!(["10.96.0.10"]));
        assert_eq!(
            recorder.reasons(),
            vec![
                (EventType::Warning, "GetDNSIP".to_string()),
                (EventType::Normal, "Mutated DNS".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn total_lookup_failure_still_patches() {
        let original = pod();
        let dns = DnsResolution {
            local: Err(DnsLookupError::NoClient),
            cluster: Err(DnsLookupError::NoClient),
        };

        let (response, _) = admit(request(original.clone(), None), dns).await;

        assert!(response.allowed);
        assert_eq!(response.warnings.as_ref().map(Vec::len), Some(2));

        let patched = apply(original, &response);
        assert!(patched["spec"]["dnsConfig"].get("nameservers").is_none());
        assert_eq!(patched["spec"]["dnsConfig"]["searches"][0], "billing.svc.cluster.local");
    }

    #[tokio::test]
    async fn namespace_falls_back_to_the_request() {
        let mut original = pod();
        original["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("namespace");

        let (response, _) = admit(request(original.clone(), None), resolved()).await;

        let patched = apply(original, &response);
        assert_eq!(patched["spec"]["dnsConfig"]["searches"][0], "billing.svc.cluster.local");
    }

    #[tokio::test]
    async fn existing_nameservers_are_capped() {
        let mut original = pod();
        original["spec"]["dnsPolicy"] = json!("None");
        original["spec"]["dnsConfig"] = json!({
            "nameservers": ["1.1.1.1", "8.8.8.8", "9.9.9.9"]
        });

        let (response, _) = admit(request(original.clone(), None), resolved()).await;

        assert!(response.allowed);
        let patched = apply(original, &response);
        assert_eq!(
            patched["spec"]["dnsConfig"]["nameservers"],
            json!(["169.254.20.10", "10.96.0.10", "1.1.1.1"])
        );
    }

    #[tokio::test]
    async fn existing_nameserver_fills_a_failed_lookup() {
        let mut original = pod();
        original["spec"]["dnsConfig"] = json!({
            "nameservers": ["1.1.1.1", "8.8.8.8", "9.9.9.9"]
        });
        let dns = DnsResolution {
            local: Err(DnsLookupError::NoClient),
            cluster: Ok("10.96.0.10".to_string()),
        };

        let (response, _) = admit(request(original.clone(), None), dns).await;

        let patched = apply(original, &response);
        assert_eq!(
            patched["spec"]["dnsConfig"]["nameservers"],
            json!(["10.96.0.10", "1.1.1.1", "8.8.8.8"])
        );
    }
}
