use serde::{Deserialize, Serialize};

use crate::{admission_request::AdmissionRequest, admission_response::AdmissionResponse};

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// The two revisions of the admission schema a webhook can be spoken to in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewSchema {
    /// `admission.k8s.io/v1beta1`, the legacy schema.
    V1beta1,
    /// `admission.k8s.io/v1`, the schema mutators work with.
    V1,
}

impl ReviewSchema {
    pub fn detect(api_version: &str, kind: &str) -> Option<ReviewSchema> {
        if kind != ADMISSION_REVIEW_KIND {
            return None;
        }
        match api_version {
            "admission.k8s.io/v1beta1" => Some(ReviewSchema::V1beta1),
            "admission.k8s.io/v1" => Some(ReviewSchema::V1),
            _ => None,
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ReviewSchema::V1beta1 => "admission.k8s.io/v1beta1",
            ReviewSchema::V1 => "admission.k8s.io/v1",
        }
    }
}

/// Envelope shared by both schema revisions; only the request and response
/// payloads differ.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review<Req, Resp> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Req>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Resp>,
}

impl<Req, Resp> Review<Req, Resp> {
    /// Build the reply envelope, echoing the schema of the incoming review.
    pub fn new_response(schema: ReviewSchema, response: Resp) -> Self {
        Review {
            api_version: Some(schema.api_version().to_owned()),
            kind: Some(ADMISSION_REVIEW_KIND.to_owned()),
            request: None,
            response: Some(response),
        }
    }
}

pub type AdmissionReview = Review<AdmissionRequest, AdmissionResponse>;
