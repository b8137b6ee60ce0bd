use std::sync::Arc;
use std::time::Duration;

use ingest::{Orchestrator, RecordSink};

use crate::config::{CollectorConfig, RunArgs};
use crate::error::CollectorError;

pub async fn run(args: RunArgs) -> Result<(), CollectorError> {
    let config = CollectorConfig::resolve(&args)?;

    for server in &config.servers {
        tracing::info!(
            link = %server.name,
            addr = %format_args!("{}:{}", server.address, server.port),
            kind = %server.kind,
            "endpoint configured"
        );
    }

    // Невозможность открыть лог — фатально, до старта link'ов.
    let sink = Arc::new(RecordSink::open(&config.sink)?);
    tracing::info!(path = %sink.path().display(), "writing records");

    let orchestrator = Orchestrator::start(
        &config.servers,
        &config.protocol,
        sink.clone(),
        Duration::from_secs(config.stats_interval_secs),
    );
    tracing::info!("data collection started, press Ctrl+C to stop");

    let signal = shutdown_signal().await;
    if let Err(e) = &signal {
        tracing::error!(error = %e, "signal handler failed, shutting down");
    }

    let report = orchestrator.shutdown().await;
    sink.close()?;

    println!(
        "Total records: {}, duration: {:.1}s, average rate: {:.2} records/sec",
        report.records,
        report.elapsed.as_secs_f64(),
        report.rate()
    );

    signal.map_err(CollectorError::Signal)
}

/// Ctrl+C или SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = term.recv() => {
                tracing::info!("received SIGTERM");
                Ok(())
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
