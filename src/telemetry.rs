use std::net::SocketAddr;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const METRICS_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9000);

/// Compact stdout logging, plus `<log_dir>/main.log` when a directory is
/// given. RUST_LOG wins over `default_filter`. Keep the returned guard alive
/// or buffered file lines are lost on exit.
pub fn init_tracing(default_filter: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "main.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(file_layer)
        .init();

    guard
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(%addr, "prometheus exporter listening on /metrics");
    metrics::gauge!("xspread_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_addr: SocketAddr) -> anyhow::Result<()> {
    tracing::debug!("built without metrics-exporter, metrics are not exported");
    Ok(())
}
