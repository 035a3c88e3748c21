use std::sync::{Arc, Mutex};

use admission_mutators::{
    dns_lookup::{DnsLookup, DnsResolution},
    events::{EventRecorder, EventType},
};
use async_trait::async_trait;
use axum::Router;
use k8s_openapi::api::core::v1::ObjectReference;
use mutating_webhook::{cli, config::Config, Collaborators, MutatingWebhook};

pub(crate) const LOCAL_DNS: &str = "169.254.20.10";
pub(crate) const CLUSTER_DNS: &str = "10.96.0.10";

pub(crate) fn default_test_config() -> Config {
    let matches = cli::build_cli()
        .try_get_matches_from(["mutating-webhook", "--ignore-kubernetes-connection-failure"])
        .unwrap();
    Config::from_args(&matches).unwrap()
}

/// Answers every lookup with the same addresses.
pub(crate) struct FixedDns;

#[async_trait]
impl DnsLookup for FixedDns {
    async fn resolve(&self) -> DnsResolution {
        DnsResolution {
            local: Ok(LOCAL_DNS.to_owned()),
            cluster: Ok(CLUSTER_DNS.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedEvent {
    pub kind: String,
    pub name: String,
    pub event_type: EventType,
    pub reason: String,
}

#[derive(Default)]
pub(crate) struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub(crate) fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventRecorder for RecordingEvents {
    fn record(&self, object: &ObjectReference, event_type: EventType, reason: &str, _note: &str) {
        self.events.lock().unwrap().push(RecordedEvent {
            kind: object.kind.clone().unwrap_or_default(),
            name: object.name.clone().unwrap_or_default(),
            event_type,
            reason: reason.to_owned(),
        });
    }
}

pub(crate) async fn app(config: Config, events: Arc<RecordingEvents>) -> Router {
    let collaborators = Collaborators {
        events,
        dns: Arc::new(FixedDns),
    };
    let webhook = MutatingWebhook::new(config, collaborators).await.unwrap();

    webhook.router()
}
