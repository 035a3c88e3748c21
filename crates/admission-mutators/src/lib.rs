//! Admission-time mutation of Kubernetes objects.
//!
//! An AdmissionReview in either the legacy or the current schema goes in
//! through [`dispatch::review`], is answered by an [`handler::AdmissionHandler`]
//! and comes back out in the schema it arrived in. Mutations are expressed as
//! RFC 6902 patches computed by diffing the object before and after a
//! [`handler::Mutator`] ran.

pub mod admission_request;
pub mod admission_response;
pub mod admission_review;
pub mod convert;
pub mod dispatch;
pub mod dns_lookup;
pub mod errors;
pub mod events;
pub mod handler;
pub mod mutators;
pub mod patch;
pub mod quantity;
pub mod v1beta1;

pub use handler::{AdmissionHandler, MutationHandler};
