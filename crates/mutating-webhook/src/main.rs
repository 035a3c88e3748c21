use anyhow::{anyhow, Result};
use mutating_webhook::{
    cli, config::Config, metrics::setup_metrics, tracing::setup_tracing, MutatingWebhook,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    // The kube client and the HTTPS server both need a process-wide provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Cannot install the default crypto provider"))?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    if config.metrics_enabled {
        setup_metrics()?;
    }

    MutatingWebhook::new_from_config(config).await?.run().await
}
