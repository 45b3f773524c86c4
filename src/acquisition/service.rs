// SignalAcquisitionService: time-boxed sampling of the wearable sensor
//
// Each run owns a dedicated OS thread, since serial reads block. The thread is
// the only producer on an unbounded FIFO channel, which gives the ordering
// guarantee: per-record events arrive in read order and the terminal event is
// always last.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::acquisition::clock::{SystemTimeSource, TimeSource};
use crate::acquisition::events::{AcquisitionEvent, LogEvent, LogKind};
use crate::acquisition::record::parse_record;
use crate::acquisition::source::{SerialPortSource, SignalSource};
use crate::config::SerialConfig;
use crate::dataset::Dataset;
use crate::error::{log_acquisition_error, AcquisitionError, ErrorCode};

/// Handle to a running acquisition
pub struct AcquisitionRun {
    events: mpsc::UnboundedReceiver<AcquisitionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl AcquisitionRun {
    /// Async stream of the run's events; the worker thread is detached
    pub fn into_stream(self) -> UnboundedReceiverStream<AcquisitionEvent> {
        UnboundedReceiverStream::new(self.events)
    }

    /// Raw receiver of the run's events; the worker thread is detached
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<AcquisitionEvent> {
        self.events
    }

    /// Block until the run ends and return every event in order
    ///
    /// Must not be called from inside an async runtime.
    pub fn collect_blocking(mut self) -> Vec<AcquisitionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.blocking_recv() {
            events.push(event);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("[Acquisition] Worker thread panicked");
            }
        }
        events
    }
}

/// Reads a serial byte stream for a bounded duration and produces a Dataset
pub struct SignalAcquisitionService {
    config: SerialConfig,
    time_source: Arc<dyn TimeSource>,
}

impl SignalAcquisitionService {
    pub fn new(config: SerialConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource::default()))
    }

    pub fn with_time_source(config: SerialConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            time_source,
        }
    }

    /// Start sampling `port` for `duration_secs` seconds
    ///
    /// The port is opened on the worker thread; an open failure is reported
    /// as a diagnostic log followed by `Failed`.
    ///
    /// # Errors
    /// - Duration is not a positive, finite number of seconds
    /// - Worker thread could not be spawned
    pub fn start(&self, port: &str, duration_secs: f64) -> Result<AcquisitionRun, AcquisitionError> {
        let config = self.config.clone();
        let port = port.to_string();
        self.start_with(duration_secs, move || {
            SerialPortSource::open(&port, &config).map(|source| Box::new(source) as Box<dyn SignalSource>)
        })
    }

    /// Start sampling an already constructed source
    pub fn start_with_source(
        &self,
        source: Box<dyn SignalSource>,
        duration_secs: f64,
    ) -> Result<AcquisitionRun, AcquisitionError> {
        self.start_with(duration_secs, move || Ok(source))
    }

    fn start_with<F>(&self, duration_secs: f64, open: F) -> Result<AcquisitionRun, AcquisitionError>
    where
        F: FnOnce() -> Result<Box<dyn SignalSource>, AcquisitionError> + Send + 'static,
    {
        let duration = validate_duration(duration_secs).inspect_err(|err| {
            log_acquisition_error(err, "start_acquisition");
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let time_source = Arc::clone(&self.time_source);

        let worker = thread::Builder::new()
            .name("mindtv-acquisition".to_string())
            .spawn(move || {
                let emitter = Emitter { tx };
                match open() {
                    Ok(source) => run_acquisition(source, duration, time_source.as_ref(), &emitter),
                    Err(err) => emitter.fail(err),
                }
            })
            .map_err(|err| AcquisitionError::WorkerFailed {
                reason: err.to_string(),
            })?;

        Ok(AcquisitionRun {
            events: rx,
            worker: Some(worker),
        })
    }
}

fn validate_duration(duration_secs: f64) -> Result<Duration, AcquisitionError> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(AcquisitionError::InvalidDuration {
            seconds: duration_secs,
        });
    }
    Ok(Duration::from_secs_f64(duration_secs))
}

/// `floor(elapsed / duration * 100)`, clamped to 100
pub fn progress_percent(elapsed: Duration, duration: Duration) -> u8 {
    let ratio = elapsed.as_secs_f64() / duration.as_secs_f64();
    (ratio * 100.0).floor().clamp(0.0, 100.0) as u8
}

/// Single producer side of the run's channel
struct Emitter {
    tx: mpsc::UnboundedSender<AcquisitionEvent>,
}

impl Emitter {
    fn emit(&self, event: AcquisitionEvent) -> Result<(), AcquisitionError> {
        self.tx
            .send(event)
            .map_err(|_| AcquisitionError::ChannelClosed)
    }

    fn log(&self, kind: LogKind, message: impl Into<String>) -> Result<(), AcquisitionError> {
        self.emit(AcquisitionEvent::Log(LogEvent::new(kind, message)))
    }

    fn fail(&self, err: AcquisitionError) {
        log_acquisition_error(&err, "acquisition_run");
        let _ = self.log(
            LogKind::Diagnostic,
            format!("Error during data collection: {}", err.message()),
        );
        let _ = self.emit(AcquisitionEvent::Failed(err));
    }
}

fn run_acquisition(
    mut source: Box<dyn SignalSource>,
    duration: Duration,
    clock: &dyn TimeSource,
    emitter: &Emitter,
) {
    let span = tracing::info_span!("acquisition", source = %source.describe());
    let _guard = span.enter();

    match sample_until(source.as_mut(), duration, clock, emitter) {
        Ok(dataset) => {
            tracing::info!(
                "[Acquisition] Run complete: {} samples in {:?}",
                dataset.len(),
                duration
            );
            let count = dataset.len();
            if emitter.emit(AcquisitionEvent::SampleCount(count)).is_ok() {
                let _ = emitter.emit(AcquisitionEvent::Completed(dataset));
            }
        }
        Err(AcquisitionError::ChannelClosed) => {
            tracing::warn!("[Acquisition] Event receiver dropped, abandoning run");
        }
        Err(err) => emitter.fail(err),
    }
}

fn sample_until(
    source: &mut dyn SignalSource,
    duration: Duration,
    clock: &dyn TimeSource,
    emitter: &Emitter,
) -> Result<Dataset, AcquisitionError> {
    let start: Instant = clock.now();
    let mut dataset = Dataset::new();

    emitter.log(
        LogKind::Diagnostic,
        format!(
            "Starting data collection on {} for {:.0}s",
            source.describe(),
            duration.as_secs_f64()
        ),
    )?;

    while clock.now().saturating_duration_since(start) < duration {
        let Some(line) = source.read_line()? else {
            continue;
        };

        emitter.log(LogKind::Record, line.as_str())?;

        match parse_record(&line) {
            Ok(sample) => {
                dataset.push(sample);
                emitter.emit(AcquisitionEvent::SampleCount(dataset.len()))?;
            }
            Err(err) => {
                tracing::debug!("[Acquisition] {}", err);
                emitter.log(LogKind::ParseError, err.message())?;
            }
        }

        let elapsed = clock.now().saturating_duration_since(start);
        emitter.emit(AcquisitionEvent::Progress(progress_percent(elapsed, duration)))?;
    }

    Ok(dataset)
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
