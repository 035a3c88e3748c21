use lazy_static::lazy_static;
use opentelemetry::{metrics::Histogram, KeyValue};
use std::convert::TryFrom;
use std::time::Duration;

use super::WebhookRequest;

lazy_static! {
    static ref WEBHOOK_REQUEST_DURATION: Histogram<u64> =
        opentelemetry::global::meter(super::METER_NAME)
            .u64_histogram("webhook_request_duration_milliseconds")
            .with_unit("ms")
            .build();
}

pub fn record_request_duration(latency: Duration, webhook_request: &WebhookRequest) {
    let millis_latency = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    // Only the path is a label here; the status lives on the counter.
    WEBHOOK_REQUEST_DURATION.record(
        millis_latency,
        &[KeyValue::new("path", webhook_request.path.clone())],
    );
}
