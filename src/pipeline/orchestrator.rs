// PipelineOrchestrator: Collect -> Train -> Predict with stage-local failures
//
// Each stage invocation runs as one background tokio task and reports back
// through the event hub; callers never block on a stage. Acquisition events
// come from the acquisition worker thread, training and prediction run on the
// blocking pool. All state transitions happen under the state mutex, and the
// matching StateChanged event is published before the lock is released, so
// subscribers observe transitions in the order they happened.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::acquisition::{
    AcquisitionEvent, AcquisitionRun, LogEvent, LogKind, SignalAcquisitionService, SignalSource,
};
use crate::config::AppConfig;
use crate::dataset::DatasetStore;
use crate::error::{
    log_pipeline_error, AcquisitionError, DatasetError, ErrorCode, ModelError, PipelineError,
};
use crate::model::{FileModelRepository, ModelRepository};
use crate::pipeline::events::{EventHub, PipelineEvent, PredictionOutput, StageOutcome};
use crate::pipeline::state::{PipelineState, Stage};
use crate::prediction::{PredictionMode, PredictionService};
use crate::training::TrainingService;

/// What a prediction stage should read and produce
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionRequest {
    /// Predict over the rows of a CSV file
    File { path: PathBuf, mode: PredictionMode },
    /// Predict over the rows accumulated by collection
    Collected { mode: PredictionMode },
    /// Write `input` with an appended prediction column to `output`
    Annotate { input: PathBuf, output: PathBuf },
}

/// Handle to a running stage task
#[derive(Debug)]
pub struct StageHandle {
    stage: Stage,
    handle: JoinHandle<Result<StageOutcome, PipelineError>>,
}

impl StageHandle {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Wait for the stage to finish
    ///
    /// Dropping the handle instead leaves the stage running in the background.
    pub async fn wait(self) -> Result<StageOutcome, PipelineError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(PipelineError::TaskFailed {
                stage: self.stage.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

struct Shared {
    state: Mutex<PipelineState>,
    store: Mutex<DatasetStore>,
    acquisition: SignalAcquisitionService,
    training: TrainingService,
    prediction: PredictionService,
    repository: Arc<dyn ModelRepository>,
    events: EventHub,
}

/// Sequences the pipeline stages and guards against re-entrant invocation
///
/// Cloning is cheap; clones share state, store and subscribers.
///
/// # Example
/// ```ignore
/// let pipeline = PipelineOrchestrator::new(&AppConfig::load());
/// let mut events = pipeline.subscribe();
/// pipeline.collect("/dev/ttyUSB0", 60.0)?.wait().await?;
/// pipeline.export("Filme de comedia")?;
/// ```
#[derive(Clone)]
pub struct PipelineOrchestrator {
    shared: Arc<Shared>,
}

impl PipelineOrchestrator {
    /// Orchestrator over the serial port and the file-backed model repository
    pub fn new(config: &AppConfig) -> Self {
        let repository: Arc<dyn ModelRepository> = Arc::new(
            FileModelRepository::new(config.model.repository_dir.clone())
                .with_retention(config.model.retain_models),
        );
        Self::with_parts(
            config,
            SignalAcquisitionService::new(config.serial.clone()),
            repository,
        )
    }

    /// Orchestrator with injected acquisition service and model repository
    pub fn with_parts(
        config: &AppConfig,
        acquisition: SignalAcquisitionService,
        repository: Arc<dyn ModelRepository>,
    ) -> Self {
        let shared = Shared {
            state: Mutex::new(PipelineState::Idle),
            store: Mutex::new(DatasetStore::new(config.dataset.clone())),
            acquisition,
            training: TrainingService::new(config.training.clone(), Arc::clone(&repository)),
            prediction: PredictionService::new(config.prediction.clone(), Arc::clone(&repository)),
            repository,
            events: EventHub::new(),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Lossless FIFO of every pipeline event from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> Result<PipelineState, PipelineError> {
        Ok(self.shared.lock_state()?.clone())
    }

    /// Rows accumulated by collection so far
    pub fn collected_rows(&self) -> Result<usize, PipelineError> {
        Ok(self.shared.lock_store()?.len())
    }

    /// Label column used for export and training
    pub fn label_column(&self) -> Result<String, PipelineError> {
        Ok(self.shared.lock_store()?.label_column().to_string())
    }

    // ========================================================================
    // STAGES
    // ========================================================================

    /// Start collecting from the serial `port` for `duration_secs`
    ///
    /// Every stage must be started from within a tokio runtime.
    ///
    /// # Errors
    /// - `RuntimeUnavailable` - no runtime entered; the state is unchanged
    /// - `StageBusy` - another stage is running
    /// - `InvalidTransition` - collection not permitted from the current state
    /// - `InvalidDuration` - the stage fails immediately
    pub fn collect(&self, port: &str, duration_secs: f64) -> Result<StageHandle, PipelineError> {
        let port = port.to_string();
        self.start_collect(duration_secs, move |service, secs| service.start(&port, secs))
    }

    /// Start collecting from an arbitrary line source (replay, tests)
    pub fn collect_from(
        &self,
        source: Box<dyn SignalSource>,
        duration_secs: f64,
    ) -> Result<StageHandle, PipelineError> {
        self.start_collect(duration_secs, move |service, secs| {
            service.start_with_source(source, secs)
        })
    }

    fn start_collect<F>(&self, duration_secs: f64, start: F) -> Result<StageHandle, PipelineError>
    where
        F: FnOnce(&SignalAcquisitionService, f64) -> Result<AcquisitionRun, AcquisitionError>,
    {
        let runtime = self.shared.runtime(Stage::Collect)?;
        let from = self.shared.begin(Stage::Collect)?;

        let run = match start(&self.shared.acquisition, duration_secs) {
            Ok(run) => run,
            Err(err) => {
                let err = PipelineError::from(err);
                self.shared.fail(Stage::Collect, from, err.clone(), true);
                return Err(err);
            }
        };

        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(async move { shared.drive_acquisition(run, from).await });

        Ok(StageHandle {
            stage: Stage::Collect,
            handle,
        })
    }

    /// Start training on labeled CSV files
    ///
    /// Empty path entries are skipped. The current model is only replaced
    /// when training succeeds.
    pub fn train<I, P>(&self, paths: I, label_column: &str) -> Result<StageHandle, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        let label_column = label_column.to_string();

        self.spawn_stage(Stage::Train, move |shared| {
            shared
                .training
                .train(&paths, &label_column)
                .map(|outcome| StageOutcome::Trained(outcome.report))
        })
    }

    /// Start a prediction with the current model
    pub fn predict(&self, request: PredictionRequest) -> Result<StageHandle, PipelineError> {
        self.spawn_stage(Stage::Predict, move |shared| {
            let output = match request {
                PredictionRequest::File { path, mode } => shared
                    .prediction
                    .predict_file(&path, mode)
                    .map(PredictionOutput::Result),
                PredictionRequest::Collected { mode } => {
                    let rows = shared.lock_store()?.snapshot();
                    shared
                        .prediction
                        .predict(&rows, mode)
                        .map(PredictionOutput::Result)
                }
                PredictionRequest::Annotate { input, output } => shared
                    .prediction
                    .annotate_file(&input, &output)
                    .map(PredictionOutput::Annotation),
            };
            output.map(StageOutcome::Predicted)
        })
    }

    /// Run `work` for `stage` on the blocking pool
    fn spawn_stage<F>(&self, stage: Stage, work: F) -> Result<StageHandle, PipelineError>
    where
        F: FnOnce(&Shared) -> Result<StageOutcome, PipelineError> + Send + 'static,
    {
        let runtime = self.shared.runtime(stage)?;
        let from = self.shared.begin(stage)?;
        let shared = Arc::clone(&self.shared);

        let handle = runtime.spawn(async move {
            let worker = Arc::clone(&shared);
            let joined = tokio::task::spawn_blocking(move || work(&*worker)).await;
            shared.finish(stage, from, joined)
        });

        Ok(StageHandle { stage, handle })
    }

    // ========================================================================
    // CONTROL
    // ========================================================================

    /// Resume from the state the failed stage was started from
    pub fn retry(&self) -> Result<PipelineState, PipelineError> {
        let mut state = self.shared.lock_state()?;

        let PipelineState::Failed { resume, .. } = &*state else {
            let err = PipelineError::InvalidTransition {
                state: state.to_string(),
                action: "retry".to_string(),
            };
            self.shared.reject(&err, "retry");
            return Err(err);
        };

        let to = (**resume).clone();
        self.shared.transition(&mut state, to.clone());
        Ok(to)
    }

    /// Mark the pipeline as trained when the repository already holds a model
    ///
    /// # Returns
    /// Id of the current model
    pub fn use_current_model(&self) -> Result<String, PipelineError> {
        let mut state = self.shared.lock_state()?;
        self.shared.ensure_idle(&state, "use_current_model")?;

        let id = self
            .shared
            .repository
            .current_id()?
            .ok_or_else(|| ModelError::NotFound {
                location: "model repository".to_string(),
            })
            .map_err(PipelineError::from)
            .inspect_err(|err| self.shared.reject(err, "use_current_model"))?;

        let to = match state.resume_point() {
            PipelineState::Idle | PipelineState::Collected => PipelineState::Trained,
            other => other.clone(),
        };
        if *state != to {
            self.shared.transition(&mut state, to);
        }

        log::info!("[Pipeline] Using current model {}", id);
        Ok(id)
    }

    // ========================================================================
    // STORE
    // ========================================================================

    /// Export accumulated rows with a constant `label`
    pub fn export(&self, label: &str) -> Result<PathBuf, PipelineError> {
        self.export_with(|store| store.export(label))
    }

    /// Export accumulated rows without a label column
    pub fn export_unlabeled(&self) -> Result<PathBuf, PipelineError> {
        self.export_with(|store| store.export_unlabeled())
    }

    fn export_with<F>(&self, export: F) -> Result<PathBuf, PipelineError>
    where
        F: FnOnce(&DatasetStore) -> Result<PathBuf, DatasetError>,
    {
        let state = self.shared.lock_state()?;
        self.shared.ensure_idle(&state, "export")?;

        let path = self
            .shared
            .lock_store()
            .and_then(|store| export(&*store).map_err(PipelineError::from))
            .inspect_err(|err| self.shared.reject(err, "export"))?;
        self.shared.log(format!("Data saved to {}", path.display()));
        Ok(path)
    }

    /// Drop every accumulated row
    pub fn clear_collected(&self) -> Result<(), PipelineError> {
        let state = self.shared.lock_state()?;
        self.shared.ensure_idle(&state, "clear_collected")?;

        self.shared
            .lock_store()
            .inspect_err(|err| self.shared.reject(err, "clear_collected"))?
            .clear();
        self.shared.log("Collected data cleared");
        Ok(())
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, PipelineState>, PipelineError> {
        self.state.lock().map_err(|_| {
            let err = PipelineError::StatePoisoned;
            log_pipeline_error(&err, "lock_state");
            err
        })
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, DatasetStore>, PipelineError> {
        self.store
            .lock()
            .map_err(|_| PipelineError::Dataset(DatasetError::StorePoisoned))
    }

    fn ensure_idle(&self, state: &PipelineState, context: &str) -> Result<(), PipelineError> {
        if state.is_busy() {
            let err = PipelineError::StageBusy {
                state: state.to_string(),
            };
            self.reject(&err, context);
            return Err(err);
        }
        Ok(())
    }

    /// Runtime the stage task will be spawned on
    fn runtime(&self, stage: Stage) -> Result<Handle, PipelineError> {
        Handle::try_current().map_err(|_| {
            let err = PipelineError::RuntimeUnavailable {
                action: stage.action().to_string(),
            };
            self.reject(&err, stage.action());
            err
        })
    }

    fn log(&self, message: impl Into<String>) {
        self.events
            .publish(PipelineEvent::Log(LogEvent::new(LogKind::Diagnostic, message)));
    }

    /// Log a refused or failed request and tell subscribers about it
    fn reject(&self, err: &PipelineError, context: &str) {
        log_pipeline_error(err, context);
        self.log(format!("{} refused: {}", context, err.message()));
    }

    /// Replace the state and announce it while the lock is held
    fn transition(&self, state: &mut PipelineState, to: PipelineState) {
        let from = std::mem::replace(state, to.clone());
        log::debug!("[Pipeline] {} -> {}", from, to);
        self.events.publish(PipelineEvent::StateChanged { from, to });
    }

    /// Enter the running state of `stage`
    ///
    /// # Returns
    /// The state the stage starts from (the resume point when failed)
    fn begin(&self, stage: Stage) -> Result<PipelineState, PipelineError> {
        let mut state = self.lock_state()?;
        self.ensure_idle(&state, stage.action())?;

        let from = state.resume_point().clone();
        if !stage.allowed_from(&from) {
            let err = PipelineError::InvalidTransition {
                state: state.to_string(),
                action: stage.action().to_string(),
            };
            self.reject(&err, stage.action());
            return Err(err);
        }

        self.transition(&mut state, stage.running_state());
        log::info!("[Pipeline] Stage {} started from {}", stage, from);
        Ok(from)
    }

    fn complete(&self, stage: Stage, from: &PipelineState, outcome: &StageOutcome) {
        self.log(outcome.summary());

        match self.lock_state() {
            Ok(mut state) => self.transition(&mut state, stage.completed_state(from)),
            Err(_) => return,
        }

        log::info!("[Pipeline] Stage {} completed", stage);
        self.events.publish(PipelineEvent::StageCompleted {
            stage,
            outcome: outcome.clone(),
        });
    }

    /// Move to `Failed`, keeping `from` as the resume point
    ///
    /// `announce` adds a diagnostic log line; acquisition failures already
    /// carry their own.
    fn fail(&self, stage: Stage, from: PipelineState, error: PipelineError, announce: bool) {
        log_pipeline_error(&error, stage.action());
        if announce {
            self.log(format!("Error during {}: {}", stage, error.message()));
        }

        if let Ok(mut state) = self.lock_state() {
            let failed = PipelineState::Failed {
                stage,
                error: error.clone(),
                resume: Box::new(from),
            };
            self.transition(&mut state, failed);
        }

        self.events.publish(PipelineEvent::StageFailed { stage, error });
    }

    fn finish(
        &self,
        stage: Stage,
        from: PipelineState,
        joined: Result<Result<StageOutcome, PipelineError>, JoinError>,
    ) -> Result<StageOutcome, PipelineError> {
        let result = joined.unwrap_or_else(|err| {
            Err(PipelineError::TaskFailed {
                stage: stage.to_string(),
                reason: err.to_string(),
            })
        });

        match result {
            Ok(outcome) => {
                self.complete(stage, &from, &outcome);
                Ok(outcome)
            }
            Err(err) => {
                self.fail(stage, from, err.clone(), true);
                Err(err)
            }
        }
    }

    /// Forward one acquisition run's events and settle the collect stage
    async fn drive_acquisition(
        &self,
        run: AcquisitionRun,
        from: PipelineState,
    ) -> Result<StageOutcome, PipelineError> {
        let mut events = run.into_stream();

        while let Some(event) = events.next().await {
            match event {
                AcquisitionEvent::Log(log) => self.events.publish(PipelineEvent::Log(log)),
                AcquisitionEvent::Progress(percent) => {
                    self.events.publish(PipelineEvent::Progress(percent))
                }
                AcquisitionEvent::SampleCount(count) => {
                    self.events.publish(PipelineEvent::SampleCount(count))
                }
                AcquisitionEvent::Completed(dataset) => {
                    let rows_added = dataset.len();
                    let accumulated = self.lock_store().map(|mut store| store.accumulate(dataset));
                    return self.finish(
                        Stage::Collect,
                        from,
                        Ok(accumulated.map(|total_rows| StageOutcome::Collected {
                            rows_added,
                            total_rows,
                        })),
                    );
                }
                AcquisitionEvent::Failed(err) => {
                    let err = PipelineError::from(err);
                    self.fail(Stage::Collect, from, err.clone(), false);
                    return Err(err);
                }
            }
        }

        self.finish(
            Stage::Collect,
            from,
            Ok(Err(AcquisitionError::WorkerFailed {
                reason: "acquisition ended without a terminal event".to_string(),
            }
            .into())),
        )
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
