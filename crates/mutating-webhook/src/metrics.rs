use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{ExportConfig, WithExportConfig};

mod webhook_request_duration;
pub use webhook_request_duration::record_request_duration;
mod webhook_requests_total;
pub use webhook_requests_total::add_webhook_request;

const METER_NAME: &str = "mutating-webhook";

/// Push metrics to an OTLP collector. The endpoint is taken from the standard
/// `OTEL_EXPORTER_OTLP_*` environment variables.
pub fn setup_metrics() -> Result<()> {
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_export_config(ExportConfig::default())
        .build()?;

    let periodic_reader =
        opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build();
    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(periodic_reader)
        .build();

    global::set_meter_provider(meter_provider);
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookRequest {
    pub(crate) path: String,
    pub(crate) status: u16,
}

#[allow(clippy::from_over_into)]
impl Into<Vec<KeyValue>> for &WebhookRequest {
    fn into(self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("path", self.path.clone()),
            KeyValue::new("status", self.status as i64),
        ]
    }
}

/// Count and time every routed request. Only matched routes are seen here,
/// so the `path` label is bounded by the configured endpoints.
pub(crate) async fn track_requests(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    let webhook_request = WebhookRequest {
        path,
        status: response.status().as_u16(),
    };
    record_request_duration(start.elapsed(), &webhook_request);
    add_webhook_request(&webhook_request);

    response
}
