//! Lossless translation between the legacy and current admission schemas.
//!
//! Every field is copied; an absent input translates to an absent output.

use crate::admission_request::{AdmissionRequest, Operation};
use crate::admission_response::{AdmissionResponse, PatchType};
use crate::v1beta1;

impl From<v1beta1::Operation> for Operation {
    fn from(operation: v1beta1::Operation) -> Self {
        match operation {
            v1beta1::Operation::Create => Operation::Create,
            v1beta1::Operation::Update => Operation::Update,
            v1beta1::Operation::Delete => Operation::Delete,
            v1beta1::Operation::Connect => Operation::Connect,
        }
    }
}

impl From<Operation> for v1beta1::Operation {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Create => v1beta1::Operation::Create,
            Operation::Update => v1beta1::Operation::Update,
            Operation::Delete => v1beta1::Operation::Delete,
            Operation::Connect => v1beta1::Operation::Connect,
        }
    }
}

impl From<v1beta1::PatchType> for PatchType {
    fn from(patch_type: v1beta1::PatchType) -> Self {
        match patch_type {
            v1beta1::PatchType::JSONPatch => PatchType::JSONPatch,
        }
    }
}

impl From<PatchType> for v1beta1::PatchType {
    fn from(patch_type: PatchType) -> Self {
        match patch_type {
            PatchType::JSONPatch => v1beta1::PatchType::JSONPatch,
        }
    }
}

impl From<v1beta1::AdmissionRequest> for AdmissionRequest {
    fn from(request: v1beta1::AdmissionRequest) -> Self {
        AdmissionRequest {
            uid: request.uid,
            kind: request.kind,
            resource: request.resource,
            sub_resource: request.sub_resource,
            request_kind: request.request_kind,
            request_resource: request.request_resource,
            request_sub_resource: request.request_sub_resource,
            name: request.name,
            namespace: request.namespace,
            operation: request.operation.into(),
            user_info: request.user_info,
            object: request.object,
            old_object: request.old_object,
            dry_run: request.dry_run,
            options: request.options,
        }
    }
}

impl From<AdmissionRequest> for v1beta1::AdmissionRequest {
    fn from(request: AdmissionRequest) -> Self {
        v1beta1::AdmissionRequest {
            uid: request.uid,
            kind: request.kind,
            resource: request.resource,
            sub_resource: request.sub_resource,
            request_kind: request.request_kind,
            request_resource: request.request_resource,
            request_sub_resource: request.request_sub_resource,
            name: request.name,
            namespace: request.namespace,
            operation: request.operation.into(),
            user_info: request.user_info,
            object: request.object,
            old_object: request.old_object,
            dry_run: request.dry_run,
            options: request.options,
        }
    }
}

impl From<v1beta1::AdmissionResponse> for AdmissionResponse {
    fn from(response: v1beta1::AdmissionResponse) -> Self {
        AdmissionResponse {
            uid: response.uid,
            allowed: response.allowed,
            patch_type: response.patch_type.map(Into::into),
            patch: response.patch,
            status: response.status,
            audit_annotations: response.audit_annotations,
            warnings: response.warnings,
        }
    }
}

impl From<AdmissionResponse> for v1beta1::AdmissionResponse {
    fn from(response: AdmissionResponse) -> Self {
        v1beta1::AdmissionResponse {
            uid: response.uid,
            allowed: response.allowed,
            patch_type: response.patch_type.map(Into::into),
            patch: response.patch,
            status: response.status,
            audit_annotations: response.audit_annotations,
            warnings: response.warnings,
        }
    }
}

pub fn request_to_v1(request: Option<v1beta1::AdmissionRequest>) -> Option<AdmissionRequest> {
    request.map(Into::into)
}

pub fn request_to_v1beta1(request: Option<AdmissionRequest>) -> Option<v1beta1::AdmissionRequest> {
    request.map(Into::into)
}

pub fn response_to_v1(response: Option<v1beta1::AdmissionResponse>) -> Option<AdmissionResponse> {
    response.map(Into::into)
}

pub fn response_to_v1beta1(
    response: Option<AdmissionResponse>,
) -> Option<v1beta1::AdmissionResponse> {
    response.map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_request::tests::build_admission_request;
    use crate::admission_response::AdmissionResponseStatus;
    use std::collections::HashMap;

    #[test]
    fn request_round_trip_is_lossless() {
        let request = build_admission_request();

        let legacy = request_to_v1beta1(Some(request.clone())).unwrap();
        assert_eq!(legacy.uid, request.uid);
        assert_eq!(legacy.operation, v1beta1::Operation::Update);
        assert_eq!(legacy.user_info, request.user_info);

        assert_eq!(request_to_v1(Some(legacy)), Some(request));
    }

    #[test]
    fn response_round_trip_is_lossless() {
        let response = AdmissionResponse {
            uid: "abc".to_string(),
            allowed: true,
            patch_type: Some(PatchType::JSONPatch),
            patch: Some("W10=".to_string()),
            status: Some(AdmissionResponseStatus {
                message: Some("done".to_string()),
                ..Default::default()
            }),
            audit_annotations: Some(HashMap::from([("k".to_string(), "v".to_string())])),
            warnings: Some(vec!["careful".to_string()]),
        };

        let legacy = response_to_v1beta1(Some(response.clone())).unwrap();
        assert_eq!(legacy.patch_type, Some(v1beta1::PatchType::JSONPatch));
        assert_eq!(response_to_v1(Some(legacy)), Some(response));
    }

    #[test]
    fn absent_stays_absent() {
        assert!(request_to_v1(None).is_none());
        assert!(request_to_v1beta1(None).is_none());
        assert!(response_to_v1(None).is_none());
        assert!(response_to_v1beta1(None).is_none());
    }

    #[test]
    fn legacy_wire_format_decodes() {
        let input = r#"{
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Node"},
            "resource": {"group": "", "version": "v1", "resource": "nodes"},
            "name": "worker-1",
            "operation": "CREATE",
            "userInfo": {"username": "system:node:worker-1"},
            "object": {"apiVersion": "v1", "kind": "Node"}
        }"#;
        let legacy: v1beta1::AdmissionRequest = serde_json::from_str(input).unwrap();
        let request: AdmissionRequest = legacy.into();

        assert_eq!(request.operation, Operation::Create);
        assert_eq!(request.resource.resource, "nodes");
        assert_eq!(request.name.as_deref(), Some("worker-1"));
    }
}
