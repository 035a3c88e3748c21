use lazy_static::lazy_static;
use opentelemetry::{metrics::Counter, KeyValue};

use super::WebhookRequest;

lazy_static! {
    static ref WEBHOOK_REQUESTS_TOTAL: Counter<u64> =
        opentelemetry::global::meter(super::METER_NAME)
            .u64_counter("webhook_requests_total")
            .with_description("Requests served, by path and HTTP status")
            .build();
}

pub fn add_webhook_request(webhook_request: &WebhookRequest) {
    WEBHOOK_REQUESTS_TOTAL.add(1, &Into::<Vec<KeyValue>>::into(webhook_request));
}
