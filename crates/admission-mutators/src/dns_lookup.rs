use async_trait::async_trait;

use crate::errors::DnsLookupError;

/// Outcome of resolving the cluster's DNS endpoints. The two lookups are
/// independent: one failing says nothing about the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResolution {
    /// Address the node-local DNS cache listens on.
    pub local: Result<String, DnsLookupError>,
    /// ClusterIP of the cluster DNS service.
    pub cluster: Result<String, DnsLookupError>,
}

#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn resolve(&self) -> DnsResolution;
}

/// Lookup used when no cluster connection is available.
pub struct UnavailableDnsLookup;

#[async_trait]
impl DnsLookup for UnavailableDnsLookup {
    async fn resolve(&self) -> DnsResolution {
        DnsResolution {
            local: Err(DnsLookupError::NoClient),
            cluster: Err(DnsLookupError::NoClient),
        }
    }
}

/// Extract the value following `-localip` from a container's arguments.
///
/// Both `-localip 169.254.20.10` and `-localip=169.254.20.10` are understood;
/// a comma separated list yields its first element.
pub fn local_ip_from_args<S: AsRef<str>>(args: &[S]) -> Option<String> {
    let mut args = args.iter().map(AsRef::as_ref);
    while let Some(arg) = args.next() {
        let value = match arg.split_once('=') {
            Some(("-localip" | "--localip", value)) => Some(value),
            None if arg == "-localip" || arg == "--localip" => args.next(),
            _ => None,
        };
        if let Some(value) = value {
            let first = value.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                return Some(first.to_owned());
            }
        }
    }
    None
}
