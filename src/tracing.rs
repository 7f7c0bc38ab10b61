use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Installs the log subscriber for `generate_status`.
///
/// `RUST_LOG` wins over `default_filter`. Diagnostics are written to stderr in
/// compact form; stdout is left to the per-window progress lines so a cron
/// wrapper can capture the two separately.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
