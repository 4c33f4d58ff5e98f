//! Battery telemetry worker
//!
//! Samples the fuel gauge on a fixed period and feeds the filter. Readers
//! (the status page and the bridge) share the filter through a cheap
//! cloneable handle.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use riberry_core::config::BatteryConfig;
use riberry_core::telemetry::{BatteryFilter, SampleOutcome, TelemetrySnapshot};
use riberry_core::traits::BatterySensor;
use tracing::{debug, info};

use crate::shutdown::ShutdownToken;

/// Read access to the filtered battery state
#[derive(Clone)]
pub struct TelemetryReader {
    filter: Arc<Mutex<BatteryFilter>>,
}

impl TelemetryReader {
    fn filter(&self) -> MutexGuard<'_, BatteryFilter> {
        self.filter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current percentage and charging estimate
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.filter().snapshot()
    }

    /// Smoothed state of charge
    pub fn filtered_percentage(&self) -> f32 {
        self.filter().filtered_percentage()
    }

    /// Smoothed state of charge, `None` until the gauge answered once
    pub fn sampled_percentage(&self) -> Option<f32> {
        let filter = self.filter();
        (filter.history_len() > 0).then(|| filter.filtered_percentage())
    }
}

/// Running telemetry worker
pub struct TelemetryHandle {
    reader: TelemetryReader,
    shutdown: ShutdownToken,
    thread: Option<JoinHandle<()>>,
}

impl TelemetryHandle {
    /// Start sampling `sensor` on its own thread until [`stop`] is called
    ///
    /// [`stop`]: TelemetryHandle::stop
    pub fn spawn<S>(sensor: S, config: &BatteryConfig) -> io::Result<Self>
    where
        S: BatterySensor + Send + 'static,
    {
        let shutdown = ShutdownToken::new();
        let reader = TelemetryReader {
            filter: Arc::new(Mutex::new(BatteryFilter::new(config.filter()))),
        };
        let period_ms = config.sample_period_ms;
        let thread = {
            let reader = reader.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("telemetry".into())
                .spawn(move || sample_loop(sensor, &reader, period_ms, &shutdown))?
        };

        Ok(Self {
            reader,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Handle for readers on other threads
    pub fn reader(&self) -> TelemetryReader {
        self.reader.clone()
    }

    /// Ask the worker to finish its current sample and exit
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the worker to exit; the sensor is dropped with it
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!(target: "riberry::battery", "telemetry worker panicked");
            }
        }
    }
}

fn sample_loop<S: BatterySensor>(
    mut sensor: S,
    reader: &TelemetryReader,
    period_ms: u32,
    shutdown: &ShutdownToken,
) {
    info!(period_ms, "telemetry started");
    while !shutdown.is_cancelled() {
        match sensor.read_sample() {
            Ok(sample) => {
                let outcome = reader.filter().update(sample);
                debug!(
                    target: "riberry::battery",
                    raw = sample.percentage,
                    charging = sample.charging,
                    filtered = reader.filtered_percentage(),
                    outlier = outcome == SampleOutcome::Outlier,
                    "battery sample"
                );
            }
            Err(err) => {
                debug!(target: "riberry::battery", ?err, "battery read failed, sample skipped");
            }
        }
        if shutdown.sleep_ms(period_ms) {
            break;
        }
    }
    info!("telemetry stopped");
}
