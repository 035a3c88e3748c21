//! Event sinks handed to the mutators.

use std::sync::Arc;

use admission_mutators::events::{EventRecorder, EventType};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    runtime::events::{self, Event, Recorder, Reporter},
    Client,
};
use tracing::{info, warn};

use crate::config::{HOSTNAME, SERVICE_NAME};

const ACTION: &str = "Mutate";

/// Publishes events to the Kubernetes API.
///
/// Publishing happens on a detached task: the admission response never waits
/// for the API server to store an event, and a failed publish is only logged.
pub struct KubeEventRecorder {
    recorder: Arc<Recorder>,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: SERVICE_NAME.to_owned(),
            instance: Some(HOSTNAME.clone()),
        };
        Self {
            recorder: Arc::new(Recorder::new(client, reporter)),
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, object: &ObjectReference, event_type: EventType, reason: &str, note: &str) {
        let event = Event {
            type_: match event_type {
                EventType::Normal => events::EventType::Normal,
                EventType::Warning => events::EventType::Warning,
            },
            reason: reason.to_owned(),
            note: Some(note.to_owned()),
            action: ACTION.to_owned(),
            secondary: None,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(reason, error = %e, "cannot publish Kubernetes event outside of a runtime");
                return;
            }
        };

        let recorder = self.recorder.clone();
        let object = object.clone();
        runtime.spawn(async move {
            if let Err(e) = recorder.publish(&event, &object).await {
                warn!(
                    reason = event.reason.as_str(),
                    kind = object.kind.as_deref().unwrap_or_default(),
                    name = object.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to publish Kubernetes event"
                );
            }
        });
    }
}

/// Writes events to the log. Used when the webhook runs without a
/// connection to the cluster.
pub struct LogEventRecorder;

impl EventRecorder for LogEventRecorder {
    fn record(&self, object: &ObjectReference, event_type: EventType, reason: &str, note: &str) {
        let kind = object.kind.as_deref().unwrap_or_default();
        let namespace = object.namespace.as_deref().unwrap_or_default();
        let name = object.name.as_deref().unwrap_or_default();
        match event_type {
            EventType::Normal => info!(kind, namespace, name, reason, note, "event"),
            EventType::Warning => warn!(kind, namespace, name, reason, note, "event"),
        }
    }
}
