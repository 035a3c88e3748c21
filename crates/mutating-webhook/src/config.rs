use anyhow::{anyhow, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::READINESS_PATH;

pub static SERVICE_NAME: &str = "mutating-webhook";

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub addr: SocketAddr,
    pub tls_config: Option<TlsConfig>,
    pub metrics_enabled: bool,
    pub ignore_kubernetes_connection_failure: bool,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
    pub endpoint_paths: EndpointPaths,
    pub cluster_domain: String,
    pub dns_lookup: DnsLookupConfig,
    pub shutdown_grace_period: Duration,
}

pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointPaths {
    pub cpu_oversell: String,
    pub dns_config: String,
}

/// Where the DNS resolvers handed to Pods are looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsLookupConfig {
    pub node_local_dns_namespace: String,
    pub node_local_dns_name: String,
    pub cluster_dns_namespace: String,
    pub cluster_dns_service: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let (cert_file, key_file) = tls_files(matches)?;
        let tls_config = if cert_file.is_empty() {
            None
        } else {
            Some(TlsConfig {
                cert_file: PathBuf::from(cert_file),
                key_file: PathBuf::from(key_file),
            })
        };

        let metrics_enabled = matches
            .get_one::<bool>("enable-metrics")
            .expect("clap should have set a default value")
            .to_owned();
        let ignore_kubernetes_connection_failure = matches
            .get_one::<bool>("ignore-kubernetes-connection-failure")
            .expect("clap should have set a default value")
            .to_owned();

        let log_level = string_arg(matches, "log-level");
        let log_fmt = string_arg(matches, "log-fmt");
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();

        let endpoint_paths = endpoint_paths(matches)?;
        let cluster_domain = string_arg(matches, "cluster-domain");
        if cluster_domain.is_empty() {
            return Err(anyhow!("error parsing arguments: --cluster-domain cannot be empty"));
        }

        let dns_lookup = DnsLookupConfig {
            node_local_dns_namespace: string_arg(matches, "node-local-dns-namespace"),
            node_local_dns_name: string_arg(matches, "node-local-dns-name"),
            cluster_dns_namespace: string_arg(matches, "cluster-dns-namespace"),
            cluster_dns_service: string_arg(matches, "cluster-dns-service"),
            timeout: seconds_arg(matches, "dns-lookup-timeout")?,
        };
        let shutdown_grace_period = seconds_arg(matches, "shutdown-grace-period")?;

        Ok(Self {
            addr,
            tls_config,
            metrics_enabled,
            ignore_kubernetes_connection_failure,
            log_level,
            log_fmt,
            log_no_color,
            endpoint_paths,
            cluster_domain,
            dns_lookup,
            shutdown_grace_period,
        })
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> String {
    matches
        .get_one::<String>(id)
        .expect("This should not happen, every string flag has a default value")
        .to_owned()
}

fn seconds_arg(matches: &ArgMatches, id: &str) -> Result<Duration> {
    let value = string_arg(matches, id);
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| anyhow!("error parsing arguments: --{id} {value:?}: {e}"))
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        string_arg(matches, "address"),
        string_arg(matches, "port")
    )
    .parse()
    .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_files(matches: &ArgMatches) -> Result<(String, String)> {
    let cert_file = string_arg(matches, "cert-file");
    let key_file = string_arg(matches, "key-file");
    if cert_file.is_empty() != key_file.is_empty() {
        Err(anyhow!("error parsing arguments: either both --cert-file and --key-file must be provided, or neither"))
    } else {
        Ok((cert_file, key_file))
    }
}

fn endpoint_paths(matches: &ArgMatches) -> Result<EndpointPaths> {
    let paths = EndpointPaths {
        cpu_oversell: string_arg(matches, "cpu-oversell-path"),
        dns_config: string_arg(matches, "dns-config-path"),
    };

    for path in [&paths.cpu_oversell, &paths.dns_config] {
        if !path.starts_with('/') {
            return Err(anyhow!(
                "error parsing arguments: endpoint path {path:?} must start with '/'"
            ));
        }
        if path == READINESS_PATH {
            return Err(anyhow!(
                "error parsing arguments: endpoint path {path:?} is reserved for the readiness probe"
            ));
        }
    }
    if paths.cpu_oversell == paths.dns_config {
        return Err(anyhow!(
            "error parsing arguments: --cpu-oversell-path and --dns-config-path must differ"
        ));
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn config_from(flags: &[&str]) -> Result<Config> {
        let mut args = vec!["mutating-webhook"];
        args.extend_from_slice(flags);
        let matches = cli::build_cli().try_get_matches_from(args)?;
        Config::from_args(&matches)
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.addr, "0.0.0.0:9443".parse().unwrap());
        assert!(config.tls_config.is_none());
        assert_eq!(
            config.endpoint_paths,
            EndpointPaths {
                cpu_oversell: "/mutating-cpu-oversell".to_owned(),
                dns_config: "/mutating-pod-dns".to_owned(),
            }
        );
        assert_eq!(config.cluster_domain, "cluster.local");
        assert_eq!(
            config.dns_lookup,
            DnsLookupConfig {
                node_local_dns_namespace: "kube-system".to_owned(),
                node_local_dns_name: "node-local-dns".to_owned(),
                cluster_dns_namespace: "kube-system".to_owned(),
                cluster_dns_service: "kube-dns".to_owned(),
                timeout: Duration::from_secs(2),
            }
        );
        assert_eq!(config.shutdown_grace_period, Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_fmt, "text");
    }

    #[test]
    fn boolean_flags() {
        let boolean_flags = [
            "--log-no-color",
            "--enable-metrics",
            "--ignore-kubernetes-connection-failure",
        ];

        for provide_flag in [true, false] {
            let flags: &[&str] = if provide_flag { &boolean_flags } else { &[] };
            let config = config_from(flags).unwrap();

            assert_eq!(provide_flag, config.log_no_color);
            assert_eq!(provide_flag, config.metrics_enabled);
            assert_eq!(provide_flag, config.ignore_kubernetes_connection_failure);
        }
    }

    #[test]
    fn tls_files_are_paired() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let cert_flag = format!("--cert-file={}", cert.path().display());
        let key_flag = format!("--key-file={}", key.path().display());

        let config = config_from(&[&cert_flag, &key_flag]).unwrap();
        let tls = config.tls_config.expect("tls should be configured");
        assert_eq!(tls.cert_file, cert.path());
        assert_eq!(tls.key_file, key.path());

        assert!(config_from(&[&cert_flag]).is_err());
        assert!(config_from(&[&key_flag]).is_err());
    }

    #[rstest]
    #[case(&["--cpu-oversell-path=mutate"])]
    #[case(&["--dns-config-path=/readiness"])]
    #[case(&["--cpu-oversell-path=/same", "--dns-config-path=/same"])]
    #[case(&["--dns-lookup-timeout=soon"])]
    #[case(&["--shutdown-grace-period=-1"])]
    #[case(&["--cluster-domain="])]
    #[case(&["--port=not-a-port"])]
    fn rejected_arguments(#[case] flags: &[&str]) {
        assert!(config_from(flags).is_err(), "{flags:?}");
    }

    #[test]
    fn custom_endpoint_paths() {
        let config = config_from(&[
            "--cpu-oversell-path=/nodes",
            "--dns-config-path=/pods",
            "--dns-lookup-timeout=5",
        ])
        .unwrap();

        assert_eq!(config.endpoint_paths.cpu_oversell, "/nodes");
        assert_eq!(config.endpoint_paths.dns_config, "/pods");
        assert_eq!(config.dns_lookup.timeout, Duration::from_secs(5));
    }
}
