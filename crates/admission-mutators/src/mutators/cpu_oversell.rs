//! Scale a node's allocatable CPU by the multiplier found in its
//! `cpu_oversell` label, and mark the node with a matching annotation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::sync::Arc;
use tracing::{info, warn};

use crate::admission_request::AdmissionRequest;
use crate::errors::OversellError;
use crate::events::{object_reference, EventRecorder, EventType};
use crate::handler::{Mutation, Mutator};
use crate::quantity::{cpu_millis, format_milli_cpu};

/// Name of both the label carrying the multiplier and the annotation
/// reporting whether oversell is in effect.
pub const CPU_OVERSELL: &str = "cpu_oversell";

const CPU: &str = "cpu";

const ANNOTATION_ENABLED: &str = "true";
const ANNOTATION_DISABLED: &str = "false";

const MESSAGE_APPLIED: &str = "CPU oversell mutation applied";
const MESSAGE_NO_CHANGE: &str = "No changes needed for allocatable CPU";
const MESSAGE_DISABLED: &str = "Added or updated annotation with value 'false'.";

/// Allocatable CPU the oversell policy settled on, in millicores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversoldCpu {
    Scaled(i64),
    /// The product was not a usable quantity; capacity is kept instead.
    Clamped(i64),
}

impl OversoldCpu {
    pub fn millis(&self) -> i64 {
        match self {
            OversoldCpu::Scaled(millis) | OversoldCpu::Clamped(millis) => *millis,
        }
    }
}

/// Policy applied to `capacity * multiplier`.
///
/// The product is rounded to micro-core precision, then up to the next
/// millicore. Products that are not finite, not positive, or too large to be
/// represented fall back to the capacity itself.
pub fn oversold_cpu(capacity_millis: i64, multiplier: f64) -> OversoldCpu {
    let product = capacity_millis as f64 * multiplier;
    if !product.is_finite() || product <= 0.0 {
        return OversoldCpu::Clamped(capacity_millis);
    }

    let millis = ((product * 1000.0).round() / 1000.0).ceil();
    if millis < 1.0 || millis >= i64::MAX as f64 {
        return OversoldCpu::Clamped(capacity_millis);
    }
    OversoldCpu::Scaled(millis as i64)
}

/// Parse the label value. Only finite numbers strictly greater than zero
/// are usable multipliers.
pub fn parse_multiplier(value: &str) -> Result<f64, OversellError> {
    let multiplier: f64 = value
        .trim()
        .parse()
        .map_err(|_| OversellError::InvalidMultiplier(value.to_owned()))?;
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(OversellError::OutOfRange(value.to_owned()));
    }
    Ok(multiplier)
}

fn capacity_millis(node: &Node) -> Result<i64, OversellError> {
    let capacity = node
        .status
        .as_ref()
        .and_then(|status| status.capacity.as_ref())
        .and_then(|capacity| capacity.get(CPU))
        .ok_or(OversellError::MissingCapacity)?;
    cpu_millis(capacity).map_err(OversellError::Capacity)
}

/// Set the annotation, returns whether the node changed.
fn set_annotation(node: &mut Node, value: &str) -> bool {
    let annotations = node.metadata.annotations.get_or_insert_with(Default::default);
    if annotations.get(CPU_OVERSELL).map(String::as_str) == Some(value) {
        return false;
    }
    annotations.insert(CPU_OVERSELL.to_owned(), value.to_owned());
    true
}

/// Set allocatable CPU unless it already holds the same amount, whatever
/// its spelling. Returns whether the node changed.
fn set_allocatable_cpu(node: &mut Node, millis: i64) -> bool {
    let allocatable = node
        .status
        .get_or_insert_with(Default::default)
        .allocatable
        .get_or_insert_with(Default::default);
    if allocatable
        .get(CPU)
        .is_some_and(|current| cpu_millis(current).ok() == Some(millis))
    {
        return false;
    }
    allocatable.insert(CPU.to_owned(), Quantity(format_milli_cpu(millis)));
    true
}

pub struct CpuOversell {
    events: Arc<dyn EventRecorder>,
}

impl CpuOversell {
    pub fn new(events: Arc<dyn EventRecorder>) -> Self {
        CpuOversell { events }
    }

    fn target(node: &Node, label: &str) -> Result<OversoldCpu, OversellError> {
        let multiplier = parse_multiplier(label)?;
        let capacity = capacity_millis(node)?;
        Ok(oversold_cpu(capacity, multiplier))
    }

    fn disable(&self, node: &mut Node) -> Mutation {
        let reference = object_reference(&*node);
        if set_annotation(node, ANNOTATION_DISABLED) {
            self.events
                .record(&reference, EventType::Normal, "Modified", MESSAGE_DISABLED);
            Mutation::mutated(MESSAGE_DISABLED)
        } else {
            self.events.record(
                &reference,
                EventType::Normal,
                "NoModification",
                MESSAGE_NO_CHANGE,
            );
            Mutation::unchanged(MESSAGE_NO_CHANGE)
        }
    }

    fn reject_label(&self, node: &mut Node, error: OversellError) -> Mutation {
        let name = node.metadata.name.clone().unwrap_or_default();
        let warning = format!("Invalid value for {CPU_OVERSELL} label on node {name}: {error}");
        warn!(node = %name, error = %error, "invalid {CPU_OVERSELL} label");

        set_annotation(node, ANNOTATION_DISABLED);
        self.events
            .record(&object_reference(&*node), EventType::Warning, "Modified", &warning);

        Mutation::mutated(error.to_string()).with_warning(format!("Warning: {warning}"))
    }

    fn oversell(&self, node: &mut Node, target: OversoldCpu) -> Mutation {
        let name = node.metadata.name.clone().unwrap_or_default();
        let mut warnings = Vec::new();
        if let OversoldCpu::Clamped(millis) = target {
            warn!(
                node = %name,
                capacity = millis,
                "oversold CPU is not a usable quantity, keeping capacity"
            );
            warnings.push(format!(
                "Warning: oversold CPU for node {name} is out of range, allocatable set to capacity"
            ));
        }

        let allocatable_changed = set_allocatable_cpu(node, target.millis());
        let annotation_changed = set_annotation(node, ANNOTATION_ENABLED);
        let reference = object_reference(&*node);

        let mut mutation = if allocatable_changed || annotation_changed {
            info!(
                node = %name,
                allocatable = %format_milli_cpu(target.millis()),
                "allocatable CPU oversold"
            );
            self.events
                .record(&reference, EventType::Normal, "Modified", MESSAGE_APPLIED);
            Mutation::mutated(MESSAGE_APPLIED)
        } else {
            self.events.record(
                &reference,
                EventType::Normal,
                "NoModification",
                MESSAGE_NO_CHANGE,
            );
            Mutation::unchanged(MESSAGE_NO_CHANGE)
        };
        mutation.warnings = warnings;
        mutation
    }
}

#[async_trait]
impl Mutator for CpuOversell {
    type Resource = Node;

    async fn mutate(
        &self,
        _request: &AdmissionRequest,
        _old: Option<&Node>,
        node: &mut Node,
    ) -> Mutation {
        let label = node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(CPU_OVERSELL))
            .cloned();

        match label {
            None => self.disable(node),
            Some(label) => match Self::target(node, &label) {
                Ok(target) => self.oversell(node, target),
                Err(error) => self.reject_label(node, error),
            },
        }
    }
}
