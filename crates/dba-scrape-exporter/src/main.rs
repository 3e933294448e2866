//! `dba-exporter` binary.

use std::sync::Arc;

use anyhow::Context as _;
use sqlx::mysql::MySqlPoolOptions;
use tracing_subscriber::EnvFilter;

use dba_scrape::ScrapeRunner;
use dba_scrape_exporter::{ExporterConfig, MetricsExporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ExporterConfig::from_env();
    tracing::info!(?config, "Loaded exporter config");

    // Connections are established on demand; an unreachable server is reported as `mysql_up 0`.
    let pool = MySqlPoolOptions::new()
        .max_connections(config.checks.len().max(1).try_into()?)
        .connect_lazy(&config.dsn)
        .context("invalid database URL")?;
    let runner = ScrapeRunner::for_checks(config.checks.iter().copied())
        .context("failed creating scrapers")?;

    MetricsExporter::new(Arc::new(runner), Arc::new(pool))
        .context("failed creating metrics exporter")?
        .with_format(config.format)
        .with_timeout(config.timeout)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "Failed listening for termination signal");
            }
        })
        .start(config.bind_address)
        .await
        .context("metrics exporter failed")?;
    Ok(())
}
