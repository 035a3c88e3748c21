use clap::builder::PossibleValue;
use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("MUTATING_WEBHOOK_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("MUTATING_WEBHOOK_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("MUTATING_WEBHOOK_LOG_NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("MUTATING_WEBHOOK_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("9443")
            .env("MUTATING_WEBHOOK_PORT")
            .help("Listen on PORT"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("")
            .env("MUTATING_WEBHOOK_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("")
            .env("MUTATING_WEBHOOK_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS"),
        Arg::new("enable-metrics")
            .long("enable-metrics")
            .env("MUTATING_WEBHOOK_ENABLE_METRICS")
            .action(ArgAction::SetTrue)
            .help("Export metrics to an OpenTelemetry collector"),
        Arg::new("cpu-oversell-path")
            .long("cpu-oversell-path")
            .value_name("PATH")
            .default_value("/mutating-cpu-oversell")
            .env("MUTATING_WEBHOOK_CPU_OVERSELL_PATH")
            .help("HTTP path serving the Node CPU oversell mutation"),
        Arg::new("dns-config-path")
            .long("dns-config-path")
            .value_name("PATH")
            .default_value("/mutating-pod-dns")
            .env("MUTATING_WEBHOOK_DNS_CONFIG_PATH")
            .help("HTTP path serving the Pod DNS configuration mutation"),
        Arg::new("cluster-domain")
            .long("cluster-domain")
            .value_name("DOMAIN")
            .default_value("cluster.local")
            .env("MUTATING_WEBHOOK_CLUSTER_DOMAIN")
            .help("Cluster domain used to build the Pod DNS search list"),
        Arg::new("node-local-dns-namespace")
            .long("node-local-dns-namespace")
            .value_name("NAMESPACE")
            .default_value("kube-system")
            .env("MUTATING_WEBHOOK_NODE_LOCAL_DNS_NAMESPACE")
            .help("Namespace of the node-local DNS DaemonSet"),
        Arg::new("node-local-dns-name")
            .long("node-local-dns-name")
            .value_name("NAME")
            .default_value("node-local-dns")
            .env("MUTATING_WEBHOOK_NODE_LOCAL_DNS_NAME")
            .help("Name of the DaemonSet whose -localip argument is the node-local resolver"),
        Arg::new("cluster-dns-namespace")
            .long("cluster-dns-namespace")
            .value_name("NAMESPACE")
            .default_value("kube-system")
            .env("MUTATING_WEBHOOK_CLUSTER_DNS_NAMESPACE")
            .help("Namespace of the cluster DNS Service"),
        Arg::new("cluster-dns-service")
            .long("cluster-dns-service")
            .value_name("NAME")
            .default_value("kube-dns")
            .env("MUTATING_WEBHOOK_CLUSTER_DNS_SERVICE")
            .help("Service whose ClusterIP is the cluster resolver"),
        Arg::new("dns-lookup-timeout")
            .long("dns-lookup-timeout")
            .value_name("SECONDS")
            .default_value("2")
            .env("MUTATING_WEBHOOK_DNS_LOOKUP_TIMEOUT")
            .help("Give up on a DNS resolver lookup after the given time"),
        Arg::new("shutdown-grace-period")
            .long("shutdown-grace-period")
            .value_name("SECONDS")
            .default_value("30")
            .env("MUTATING_WEBHOOK_SHUTDOWN_GRACE_PERIOD")
            .help("Time granted to in-flight requests once a shutdown signal is received"),
        Arg::new("ignore-kubernetes-connection-failure")
            .long("ignore-kubernetes-connection-failure")
            .env("MUTATING_WEBHOOK_IGNORE_KUBERNETES_CONNECTION_FAILURE")
            .action(ArgAction::SetTrue)
            .help("Do not exit with an error if the Kubernetes connection fails. Events are only logged and DNS lookups always fail without a connection."),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
