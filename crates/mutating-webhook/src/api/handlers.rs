use std::sync::Arc;

use admission_mutators::{
    admission_request::AdmissionRequest, admission_response::AdmissionResponse, dispatch,
    errors::DispatchError, AdmissionHandler,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, Span};

use crate::api::{api_error::ApiError, state::EndpointState};

#[tracing::instrument(
    name = "admission_review",
    fields(
        endpoint=state.endpoint.name(),
        host=crate::config::HOSTNAME.as_str(),
        request_uid=tracing::field::Empty,
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        subresource=tracing::field::Empty,
        kind=tracing::field::Empty,
        resource=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Answer an AdmissionReview with the mutation owned by the endpoint.
pub(crate) async fn mutate_handler(
    extract::State(state): extract::State<Arc<EndpointState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    ensure_json_content_type(&headers)?;
    debug!(body_len = body.len(), "admission review received");

    let traced = TracedHandler {
        inner: state.handler.as_ref(),
    };
    let review = dispatch::review(&traced, &body).await?;

    Ok(([(header::CONTENT_TYPE, "application/json")], review))
}

pub(crate) async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// Only the media type essence is checked, so `application/json; charset=utf-8`
/// is accepted.
fn ensure_json_content_type(headers: &HeaderMap) -> Result<(), DispatchError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match content_type.parse::<mime::Mime>() {
        Ok(media_type) if media_type.essence_str() == mime::APPLICATION_JSON.essence_str() => {
            Ok(())
        }
        _ => Err(DispatchError::UnsupportedMediaType(content_type.to_owned())),
    }
}

/// Records the request and its outcome on the `admission_review` span.
struct TracedHandler<'a> {
    inner: &'a dyn AdmissionHandler,
}

#[async_trait]
impl AdmissionHandler for TracedHandler<'_> {
    async fn admit(&self, request: &AdmissionRequest) -> AdmissionResponse {
        populate_span_with_admission_request_data(request);
        let response = self.inner.admit(request).await;
        populate_span_with_mutation_results(&response);
        response
    }
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    let span = Span::current();
    span.record("request_uid", adm_req.uid.as_str());
    span.record("kind", adm_req.kind.kind.as_str());
    span.record("resource", adm_req.resource.resource.as_str());
    span.record("operation", adm_req.operation.as_str());
    span.record("name", adm_req.name.as_deref().unwrap_or_default());
    span.record("namespace", adm_req.namespace.as_deref().unwrap_or_default());
    span.record(
        "subresource",
        adm_req.sub_resource.as_deref().unwrap_or_default(),
    );
}

fn populate_span_with_mutation_results(response: &AdmissionResponse) {
    let span = Span::current();
    span.record("allowed", response.allowed);
    span.record("mutated", response.patch.is_some());
    if let Some(message) = response.message() {
        span.record("response_message", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(Some("application/json"), true)]
    #[case(Some("application/json; charset=utf-8"), true)]
    #[case(Some("text/plain"), false)]
    #[case(Some("application/yaml"), false)]
    #[case(None, false)]
    fn content_type_check(#[case] content_type: Option<&str>, #[case] accepted: bool) {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(content_type).unwrap(),
            );
        }

        let result = ensure_json_content_type(&headers);
        assert_eq!(result.is_ok(), accepted, "{content_type:?}");
        if let Err(error) = result {
            assert_eq!(error.status_code(), 415);
        }
    }
}
