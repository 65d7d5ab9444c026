use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use xspread_rs::market_data::router::Router;
use xspread_rs::persist::{CsvSpreadSink, FanoutSink, SpreadSink, TracingSpreadSink};
use xspread_rs::settings::{level_directive, Settings, DEFAULT_CONFIG_FILE};
use xspread_rs::telemetry;

/// Cross-exchange futures spread scanner.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (JSON, TOML or YAML by extension).
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `log_level` from the settings file.
    #[arg(long)]
    log_level: Option<String>,

    /// Don't write spread CSV files, only log them.
    #[arg(long)]
    no_csv: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    let filter = match &cli.log_level {
        Some(level) => level_directive(level),
        None => settings.tracing_filter(),
    };
    let _log_guard = telemetry::init_tracing(&filter, settings.log_dir.as_deref());

    if settings.metrics {
        telemetry::init_metrics(telemetry::METRICS_ADDR.into())?;
    }

    info!(
        coins = ?settings.coins,
        exchanges = ?settings.exchanges,
        scan_frequency_ms = settings.scan_frequency.as_millis() as u64,
        min_profit = settings.min_profit,
        "starting xspread"
    );

    let mut sink = FanoutSink::new().with(Arc::new(TracingSpreadSink));
    if !cli.no_csv {
        let csv = CsvSpreadSink::new(&settings.spread_dir)
            .with_context(|| format!("creating spread directory {}", settings.spread_dir.display()))?;
        sink = sink.with(Arc::new(csv));
    }
    let sink: Arc<dyn SpreadSink> = Arc::new(sink);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // dropping the sender would stop everything
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    Router::from_settings(&settings).run(sink, shutdown_rx).await?;

    info!("bye");
    Ok(())
}
