//! Terminal live view
//!
//! Redraws a one-line summary of the retained window on a fixed interval,
//! reading the shared buffer through snapshots only.

use receiver::ShutdownSignal;
use ring_buffer::{SampleBuffer, Snapshot};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Default refresh period of the live view (ms)
pub const DEFAULT_ANIM_INTERVAL_MS: u64 = 100;

/// Fewer points than this isn't a line yet
const MIN_POINTS: usize = 2;

/// Summary of the currently retained window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub points: usize,
    /// Elapsed seconds covered by the window
    pub span_s: f64,
    pub latest_elapsed_s: f64,
    pub latest_temperature_c: f64,
    pub latest_pressure_hpa: f64,
    pub temperature_range: (f64, f64),
    pub pressure_range: (f64, f64),
}

impl WindowSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        if snapshot.len() < MIN_POINTS {
            return None;
        }
        let (latest_elapsed_s, latest_temperature_c, latest_pressure_hpa) = snapshot.latest()?;
        Some(Self {
            points: snapshot.len(),
            span_s: latest_elapsed_s - snapshot.elapsed_s[0],
            latest_elapsed_s,
            latest_temperature_c,
            latest_pressure_hpa,
            temperature_range: min_max(&snapshot.temperature_c),
            pressure_range: min_max(&snapshot.pressure_hpa),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "t={:.1}s n={} span={:.1}s | T={:.2}°C [{:.2}..{:.2}] | P={:.2}hPa [{:.2}..{:.2}]",
            self.latest_elapsed_s,
            self.points,
            self.span_s,
            self.latest_temperature_c,
            self.temperature_range.0,
            self.temperature_range.1,
            self.latest_pressure_hpa,
            self.pressure_range.0,
            self.pressure_range.1,
        )
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Periodic reader of the sample buffer
pub struct LiveView {
    buffer: Arc<SampleBuffer>,
    interval: Duration,
}

impl LiveView {
    pub fn new(buffer: Arc<SampleBuffer>, interval: Duration) -> Self {
        Self { buffer, interval }
    }

    /// Redraw on stdout until shutdown is requested; returns the number of
    /// frames drawn
    pub async fn run(&self, shutdown: &ShutdownSignal) -> u64 {
        self.run_on(&mut std::io::stdout(), shutdown).await
    }

    /// Redraw on `out` until shutdown is requested. A failed write stops the
    /// redrawing but not the wait for shutdown.
    pub async fn run_on<W: Write>(&self, out: &mut W, shutdown: &ShutdownSignal) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0;
        let mut drawing = true;

        while !shutdown.is_requested() {
            ticker.tick().await;
            if !drawing {
                continue;
            }
            if let Some(summary) = WindowSummary::from_snapshot(&self.buffer.snapshot()) {
                let drawn = write!(out, "\r\x1b[2K{}", summary.render())
                    .and_then(|_| out.flush());
                match drawn {
                    Ok(()) => frames += 1,
                    Err(e) => {
                        debug!("Live view output unavailable, no longer redrawing: {}", e);
                        drawing = false;
                    }
                }
            }
        }

        if drawing && frames > 0 {
            if let Err(e) = writeln!(out) {
                debug!("Failed to end live view line: {}", e);
            }
        }
        frames
    }
}
