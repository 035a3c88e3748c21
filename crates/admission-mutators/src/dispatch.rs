use serde::Deserialize;
use tracing::debug;

use crate::admission_review::{AdmissionReview, ReviewSchema};
use crate::convert;
use crate::errors::{DispatchError, Result};
use crate::handler::AdmissionHandler;
use crate::v1beta1;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

/// Identify which admission schema `body` is written in.
pub fn detect_schema(body: &[u8]) -> Result<ReviewSchema> {
    let type_meta: TypeMeta = serde_json::from_slice(body).map_err(DispatchError::Decode)?;
    ReviewSchema::detect(&type_meta.api_version, &type_meta.kind).ok_or(
        DispatchError::UnsupportedSchema {
            api_version: type_meta.api_version,
            kind: type_meta.kind,
        },
    )
}

/// Decode an AdmissionReview in either schema, let `handler` answer it and
/// encode the reply in the schema the review came in.
///
/// The reply always carries the uid of the request, whatever the handler
/// put there.
pub async fn review(handler: &dyn AdmissionHandler, body: &[u8]) -> Result<Vec<u8>> {
    let schema = detect_schema(body)?;
    debug!(api_version = schema.api_version(), "admission review received");

    match schema {
        ReviewSchema::V1 => {
            let review: AdmissionReview =
                serde_json::from_slice(body).map_err(DispatchError::Decode)?;
            let request = review.request.ok_or(DispatchError::MissingRequest)?;

            let mut response = handler.admit(&request).await;
            response.uid = request.uid;

            serde_json::to_vec(&AdmissionReview::new_response(schema, response))
                .map_err(DispatchError::Encode)
        }
        ReviewSchema::V1beta1 => {
            let review: v1beta1::AdmissionReview =
                serde_json::from_slice(body).map_err(DispatchError::Decode)?;
            let request = convert::request_to_v1(review.request)
                .ok_or(DispatchError::MissingRequest)?;

            let mut response = v1beta1::AdmissionResponse::from(handler.admit(&request).await);
            response.uid = request.uid;

            serde_json::to_vec(&v1beta1::AdmissionReview::new_response(schema, response))
                .map_err(DispatchError::Encode)
        }
    }
}
