//! Telemetry Monitor
//!
//! Wires the receiver, the sample buffer, the CSV log and the live view into
//! one process and owns the startup/teardown order.

pub mod config;
pub mod live_view;
pub mod signals;

pub use config::AppConfig;
pub use live_view::{LiveView, WindowSummary};
pub use signals::TerminationListener;

use receiver::{SampleConsumer, ShutdownSignal, TelemetryReceiver};
use ring_buffer::SampleBuffer;
use std::sync::Arc;
use telemetry_log::{CsvSampleLog, FlushingLog};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the monitor until Ctrl-C or SIGTERM
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let shutdown = ShutdownSignal::new();
    let buffer = Arc::new(SampleBuffer::new(config.max_points));
    let log = Arc::new(FlushingLog::new(
        CsvSampleLog::create(&config.logs_dir)?,
        config.flush_every,
    ));

    let consumers: Vec<Box<dyn SampleConsumer>> =
        vec![Box::new(Arc::clone(&buffer)), Box::new(Arc::clone(&log))];
    let mut rx = TelemetryReceiver::bind(config.receiver_config(), shutdown.clone(), consumers)?;
    rx.start()?;
    info!("Logging to {}", log.path().display());

    let mut listener = TerminationListener::install()?;
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match listener.recv().await {
            Ok(source) => {
                if signal.request_shutdown() {
                    info!("Shutdown requested ({})", source);
                }
            }
            Err(e) => warn!("Failed to listen for termination signals: {}", e),
        }
    });

    let view = LiveView::new(Arc::clone(&buffer), config.anim_interval());
    view.run(&shutdown).await;

    shutdown.request_shutdown();
    teardown(&mut rx, &log);

    let stats = rx.stats();
    info!(
        "Received {} datagrams: {} samples, {} rejected, {} logged",
        stats.datagrams,
        stats.samples,
        stats.rejected,
        log.received()
    );
    Ok(())
}

/// Stop the receiver first, then release the log it was writing to
fn teardown(rx: &mut TelemetryReceiver, log: &FlushingLog) {
    if let Err(e) = tokio::task::block_in_place(|| rx.close()) {
        warn!("Receiver did not stop cleanly: {}", e);
    }
    if let Err(e) = log.close() {
        error!("Failed to close sample log: {}", e);
    }
}
