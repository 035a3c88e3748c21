use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::admission_request::{AdmissionRequest, GroupVersionResource, Operation};
use crate::admission_response::AdmissionResponse;
use crate::errors::DecodeError;
use crate::patch;

/// Anything able to answer an admission request expressed in the current
/// schema. Implementations never fail: every problem is turned into a
/// response.
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    async fn admit(&self, request: &AdmissionRequest) -> AdmissionResponse;
}

/// How a mutator classified its own run. Only used for reporting: whether a
/// patch is emitted is decided by comparing the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Mutated,
    Unchanged,
    /// The mutator decided the request is not its business, e.g. a status
    /// only update.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub outcome: Outcome,
    pub warnings: Vec<String>,
    pub message: Option<String>,
}

impl Mutation {
    pub fn mutated(message: impl Into<String>) -> Self {
        Mutation {
            outcome: Outcome::Mutated,
            warnings: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn unchanged(message: impl Into<String>) -> Self {
        Mutation {
            outcome: Outcome::Unchanged,
            warnings: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Mutation {
            outcome: Outcome::Skipped,
            warnings: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A rule rewriting one kind of object.
#[async_trait]
pub trait Mutator: Send + Sync {
    type Resource: k8s_openapi::Resource + Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Whether the currently persisted object must be decoded on UPDATE and
    /// handed to [`Mutator::mutate`].
    const COMPARES_OLD_OBJECT: bool = false;

    /// Rewrite `object` in place. `old` is only set on UPDATE and only for
    /// mutators comparing against the persisted object.
    async fn mutate(
        &self,
        request: &AdmissionRequest,
        old: Option<&Self::Resource>,
        object: &mut Self::Resource,
    ) -> Mutation;
}

/// Drives a [`Mutator`] through a request: validate the resource kind,
/// decode, mutate a copy, then answer with the difference.
pub struct MutationHandler<M> {
    mutator: M,
}

impl<M: Mutator> MutationHandler<M> {
    pub fn new(mutator: M) -> Self {
        MutationHandler { mutator }
    }
}

fn decode<K>(raw: &RawExtension) -> Result<K, DecodeError>
where
    K: k8s_openapi::Resource + DeserializeOwned,
{
    if let Some(found) = raw.0.get("kind").and_then(|kind| kind.as_str()) {
        if found != K::KIND {
            return Err(DecodeError::UnexpectedKind {
                expected: K::KIND,
                found: found.to_owned(),
            });
        }
    }
    serde_json::from_value(raw.0.clone()).map_err(|source| DecodeError::Object {
        kind: K::KIND,
        source,
    })
}

#[async_trait]
impl<M> AdmissionHandler for MutationHandler<M>
where
    M: Mutator + 'static,
{
    async fn admit(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let uid = request.uid.clone();

        let expected = GroupVersionResource::of::<M::Resource>();
        if request.resource != expected {
            warn!(
                resource = %request.resource,
                expected = %expected,
                "request is for an unexpected resource"
            );
            return AdmissionResponse::reject(uid, format!("expected resource to be {expected}"));
        }

        let Some(raw) = request.object.as_ref() else {
            debug!(operation = request.operation.as_str(), "no object to mutate");
            return AdmissionResponse::allow(uid).with_message(Some("no object to mutate".into()));
        };

        let object: M::Resource = match decode(raw) {
            Ok(object) => object,
            Err(e) => {
                warn!(error = %e, "cannot decode object");
                return AdmissionResponse::from_error(uid, &e);
            }
        };

        let old = if M::COMPARES_OLD_OBJECT && request.operation == Operation::Update {
            let decoded = request
                .old_object
                .as_ref()
                .ok_or(DecodeError::MissingOldObject)
                .and_then(decode::<M::Resource>);
            match decoded {
                Ok(old) => Some(old),
                Err(e) => {
                    warn!(error = %e, "cannot decode old object");
                    return AdmissionResponse::from_error(uid, &e);
                }
            }
        } else {
            None
        };

        let mut modified = object.clone();
        let mutation = self
            .mutator
            .mutate(request, old.as_ref(), &mut modified)
            .await;

        if mutation.outcome == Outcome::Skipped {
            info!(reason = ?mutation.message, "mutation skipped");
            return AdmissionResponse::allow(uid)
                .with_warnings(mutation.warnings)
                .with_message(mutation.message);
        }

        match patch::patch_response(
            &uid,
            Some(&object),
            Some(&modified),
            mutation.warnings,
            mutation.message,
        ) {
            Ok(response) => {
                info!(
                    outcome = ?mutation.outcome,
                    patched = response.patch.is_some(),
                    warnings = response.warnings.as_ref().map_or(0, Vec::len),
                    "mutation evaluated"
                );
                response
            }
            Err(e) => {
                error!(error = %e, "cannot build JSON patch");
                AdmissionResponse::from_error(uid, &e)
            }
        }
    }
}
