use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use crate::admission_response::{AdmissionResponse, PatchType};
use crate::errors::PatchError;

/// Compute the RFC 6902 operations turning `original` into `modified`.
///
/// Both sides are compared through their JSON representation, so the result
/// only depends on the serialized documents. Object keys are visited in
/// sorted order, which makes the output stable for equal inputs.
pub fn diff<T: Serialize>(original: &T, modified: &T) -> Result<json_patch::Patch, PatchError> {
    let original = serde_json::to_value(original).map_err(PatchError::SerializeObject)?;
    let modified = serde_json::to_value(modified).map_err(PatchError::SerializeObject)?;

    Ok(json_patch::diff(&original, &modified))
}

/// Base64 encoding of the JSON patch, `None` when there is nothing to apply.
pub fn encode(patch: &json_patch::Patch) -> Result<Option<String>, PatchError> {
    if patch.0.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(patch)
        .map(|s| Some(general_purpose::STANDARD.encode(s)))
        .map_err(PatchError::SerializePatch)
}

/// Build an allowing response describing the change from `original` to
/// `modified`.
///
/// When either side is missing, or the two serialize to the same document,
/// the response carries neither patch nor patch type.
pub fn patch_response<T: Serialize>(
    uid: &str,
    original: Option<&T>,
    modified: Option<&T>,
    warnings: Vec<String>,
    message: Option<String>,
) -> Result<AdmissionResponse, PatchError> {
    let mut response = AdmissionResponse::allow(uid.to_owned())
        .with_warnings(warnings)
        .with_message(message);

    if let (Some(original), Some(modified)) = (original, modified) {
        response.patch = encode(&diff(original, modified)?)?;
        if response.patch.is_some() {
            response.patch_type = Some(PatchType::JSONPatch);
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn decode(patch: &str) -> Value {
        let raw = general_purpose::STANDARD.decode(patch).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn equal_documents_produce_no_patch() {
        let doc = json!({"metadata": {"name": "a"}, "spec": {"x": [1, 2]}});
        let response = patch_response("uid", Some(&doc), Some(&doc), vec![], None).unwrap();

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());

        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire.get("patch").is_none());
        assert!(wire.get("patchType").is_none());
    }

    #[test]
    fn missing_side_produces_no_patch() {
        let doc = json!({"a": 1});
        let response = patch_response(
            "uid",
            None,
            Some(&doc),
            vec![],
            Some("no object".to_string()),
        )
        .unwrap();

        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
        assert_eq!(response.message(), Some("no object"));
    }

    #[test]
    fn patch_describes_the_change() {
        let original = json!({
            "metadata": {"name": "n", "annotations": {"keep": "me"}},
            "status": {"allocatable": {"cpu": "4"}}
        });
        let modified = json!({
            "metadata": {"name": "n", "annotations": {"keep": "me", "cpu_oversell": "true"}},
            "status": {"allocatable": {"cpu": "8000m"}}
        });

        let response = patch_response(
            "uid",
            Some(&original),
            Some(&modified),
            vec!["w".to_string()],
            None,
        )
        .unwrap();

        assert_eq!(response.patch_type, Some(PatchType::JSONPatch));
        assert_eq!(response.warnings, Some(vec!["w".to_string()]));

        let ops = decode(response.patch.as_ref().unwrap());
        let ops_list = ops.as_array().unwrap();
        assert_eq!(ops_list.len(), 2);
        assert!(ops_list.contains(
            &json!({"op": "add", "path": "/metadata/annotations/cpu_oversell", "value": "true"})
        ));
        assert!(ops_list
            .contains(&json!({"op": "replace", "path": "/status/allocatable/cpu", "value": "8000m"})));

        let mut patched = original.clone();
        let patch: json_patch::Patch = serde_json::from_value(ops).unwrap();
        json_patch::patch(&mut patched, &patch.0).unwrap();
        assert_eq!(patched, modified);
    }

    #[test]
    fn diff_is_deterministic() {
        let original = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let modified = json!({"b": 2, "a": {"z": 3, "y": 4}, "c": 5});

        let first = diff(&original, &modified).unwrap();
        let second = diff(&original, &modified).unwrap();
        assert_eq!(first, second);
    }
}
