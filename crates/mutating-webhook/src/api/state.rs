use std::sync::Arc;

use admission_mutators::AdmissionHandler;

/// The mutations this webhook serves. Each one is mounted on its own path
/// and owns its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CpuOversell,
    DnsConfig,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::CpuOversell => "cpu-oversell",
            Endpoint::DnsConfig => "dns-config",
        }
    }
}

pub(crate) struct EndpointState {
    pub(crate) endpoint: Endpoint,
    pub(crate) handler: Arc<dyn AdmissionHandler>,
}
