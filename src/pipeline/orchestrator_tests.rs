use super::*;
use crate::acquisition::{ScriptedSource, StubTimeSource};
use crate::config::SerialConfig;
use crate::model::InMemoryModelRepository;
use crate::prediction::{AnnotationReport, PredictionResult};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.dataset.export_dir = dir.path().to_path_buf();
    config.training.n_trees = 15;
    config
}

/// Orchestrator with a deterministic clock and an in-memory repository
fn stub_pipeline(dir: &TempDir) -> (PipelineOrchestrator, Arc<InMemoryModelRepository>) {
    let repo = Arc::new(InMemoryModelRepository::new());
    let acquisition = SignalAcquisitionService::with_time_source(
        SerialConfig::default(),
        Arc::new(StubTimeSource::new()),
    );
    let pipeline = PipelineOrchestrator::with_parts(&config_in(dir), acquisition, repo.clone());
    (pipeline, repo)
}

fn scripted(lines: &[&str]) -> Box<dyn SignalSource> {
    Box::new(ScriptedSource::from_lines(lines.iter().copied()))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn write_labeled(dir: &TempDir, name: &str) -> PathBuf {
    let mut contents = String::from("beatsPerMinute,beatAvg,GSR,Content\n");
    for i in 0..10 {
        let j = i as f64;
        contents.push_str(&format!("{},{},{},comedy\n", 62.0 + j, 61.0 + j, 420.0 + j));
        contents.push_str(&format!("{},{},{},horror\n", 104.0 + j, 98.0 + j, 690.0 + j));
    }
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn failed_stage(state: &PipelineState) -> Option<Stage> {
    match state {
        PipelineState::Failed { stage, .. } => Some(*stage),
        _ => None,
    }
}

#[tokio::test]
async fn test_collect_accumulates_and_reports_in_order() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let mut rx = pipeline.subscribe();

    let outcome = pipeline
        .collect_from(scripted(&["72,70,450", "74,71,455", "bad,row", "73,70.5,460"]), 1.0)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StageOutcome::Collected {
            rows_added: 3,
            total_rows: 3
        }
    );
    assert_eq!(pipeline.state().unwrap(), PipelineState::Collected);
    assert_eq!(pipeline.collected_rows().unwrap(), 3);

    let events = drain(&mut rx);
    assert_eq!(
        events.first(),
        Some(&PipelineEvent::StateChanged {
            from: PipelineState::Idle,
            to: PipelineState::Collecting
        })
    );
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::StageCompleted {
            stage: Stage::Collect,
            ..
        })
    ));

    let parse_errors = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Log(log) if log.kind == LogKind::ParseError))
        .count();
    assert_eq!(parse_errors, 1);

    let last_count = events.iter().rev().find_map(|e| match e {
        PipelineEvent::SampleCount(n) => Some(*n),
        _ => None,
    });
    assert_eq!(last_count, Some(3));
}

#[tokio::test]
async fn test_repeated_collect_appends() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);

    pipeline
        .collect_from(scripted(&["72,70,450", "74,71,455"]), 0.5)
        .unwrap()
        .wait()
        .await
        .unwrap();
    let outcome = pipeline
        .collect_from(scripted(&["73,70.5,460"]), 0.5)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StageOutcome::Collected {
            rows_added: 1,
            total_rows: 3
        }
    );

    let path = pipeline.export("comedy").unwrap();
    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written.lines().count(), 4);
    assert_eq!(written.lines().next(), Some("beatsPerMinute,beatAvg,GSR,Content"));

    let second = pipeline.export("comedy").unwrap();
    assert_ne!(path, second);
}

#[tokio::test]
async fn test_reentrant_invocation_rejected() {
    let dir = TempDir::new().unwrap();
    let pipeline = PipelineOrchestrator::with_parts(
        &config_in(&dir),
        SignalAcquisitionService::new(SerialConfig::default()),
        Arc::new(InMemoryModelRepository::new()),
    );
    let source = ScriptedSource::from_lines(["72,70,450"]).with_idle_delay(Duration::from_millis(5));

    let running = pipeline.collect_from(Box::new(source), 0.3).unwrap();
    assert_eq!(pipeline.state().unwrap(), PipelineState::Collecting);

    assert!(matches!(
        pipeline.collect_from(scripted(&["72,70,450"]), 0.3),
        Err(PipelineError::StageBusy { .. })
    ));
    assert!(matches!(
        pipeline.train(["a.csv"], "Content"),
        Err(PipelineError::StageBusy { .. })
    ));
    assert!(matches!(
        pipeline.export("comedy"),
        Err(PipelineError::StageBusy { .. })
    ));
    assert!(matches!(
        pipeline.retry(),
        Err(PipelineError::InvalidTransition { .. })
    ));

    running.wait().await.unwrap();
    assert_eq!(pipeline.state().unwrap(), PipelineState::Collected);
}

#[tokio::test]
async fn test_stream_fault_fails_collect_and_retry_resumes() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let mut rx = pipeline.subscribe();

    let source = ScriptedSource::from_lines(["72,70,450"]).then_fault("device unplugged");
    let err = pipeline
        .collect_from(Box::new(source), 1.0)
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Acquisition(AcquisitionError::Stream { .. })
    ));
    let state = pipeline.state().unwrap();
    assert_eq!(failed_stage(&state), Some(Stage::Collect));
    assert_eq!(state.resume_point(), &PipelineState::Idle);
    // Nothing from the aborted run reaches the store
    assert_eq!(pipeline.collected_rows().unwrap(), 0);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::StageCompleted { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::StageFailed {
            stage: Stage::Collect,
            ..
        })
    ));

    assert_eq!(pipeline.retry().unwrap(), PipelineState::Idle);
    pipeline
        .collect_from(scripted(&["72,70,450"]), 0.5)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(pipeline.state().unwrap(), PipelineState::Collected);
}

#[tokio::test]
async fn test_invalid_duration_fails_stage_immediately() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);

    let result = pipeline.collect_from(scripted(&["72,70,450"]), 0.0);

    assert!(matches!(
        result,
        Err(PipelineError::Acquisition(AcquisitionError::InvalidDuration { .. }))
    ));
    assert_eq!(failed_stage(&pipeline.state().unwrap()), Some(Stage::Collect));
}

#[tokio::test]
async fn test_train_then_predict_file() {
    let dir = TempDir::new().unwrap();
    let (pipeline, repo) = stub_pipeline(&dir);
    let labeled = write_labeled(&dir, "labeled.csv");

    assert!(matches!(
        pipeline.predict(PredictionRequest::File {
            path: labeled.clone(),
            mode: PredictionMode::MajorityVote,
        }),
        Err(PipelineError::InvalidTransition { .. })
    ));

    let outcome = pipeline
        .train([&labeled], "Content")
        .unwrap()
        .wait()
        .await
        .unwrap();
    let report = match outcome {
        StageOutcome::Trained(report) => report,
        other => panic!("Expected training report, got {:?}", other),
    };
    assert_eq!(report.accuracy, 1.0);
    assert_eq!(repo.current_id().unwrap(), Some(report.model_id));
    assert_eq!(pipeline.state().unwrap(), PipelineState::Trained);

    let window = dir.path().join("window.csv");
    fs::write(
        &window,
        "beatsPerMinute,beatAvg,GSR\n63,62,421\n105,99,691\n64,63,422\n",
    )
    .unwrap();

    let outcome = pipeline
        .predict(PredictionRequest::File {
            path: window.clone(),
            mode: PredictionMode::MajorityVote,
        })
        .unwrap()
        .wait()
        .await
        .unwrap();

    match outcome {
        StageOutcome::Predicted(PredictionOutput::Result(PredictionResult::MajorityVote {
            label,
            counts,
        })) => {
            assert_eq!(label, "comedy");
            assert_eq!(counts, vec![("comedy".to_string(), 2), ("horror".to_string(), 1)]);
        }
        other => panic!("Expected majority vote, got {:?}", other),
    }
    assert_eq!(pipeline.state().unwrap(), PipelineState::Predicted);

    // Predicting again from Predicted is allowed
    let outcome = pipeline
        .predict(PredictionRequest::Annotate {
            input: window,
            output: dir.path().join("annotated.csv"),
        })
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        StageOutcome::Predicted(PredictionOutput::Annotation(AnnotationReport { rows: 3, .. }))
    ));
}

#[tokio::test]
async fn test_schema_error_fails_train_without_touching_model() {
    let dir = TempDir::new().unwrap();
    let (pipeline, repo) = stub_pipeline(&dir);
    let labeled = write_labeled(&dir, "labeled.csv");
    pipeline
        .train([&labeled], "Content")
        .unwrap()
        .wait()
        .await
        .unwrap();
    let baseline = repo.current_id().unwrap();

    let err = pipeline
        .train([&labeled], "Emotion")
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Dataset(DatasetError::Schema { .. })
    ));
    assert_eq!(repo.current_id().unwrap(), baseline);

    let state = pipeline.state().unwrap();
    assert_eq!(failed_stage(&state), Some(Stage::Train));
    assert_eq!(state.resume_point(), &PipelineState::Trained);
    assert_eq!(pipeline.retry().unwrap(), PipelineState::Trained);
}

#[tokio::test]
async fn test_use_current_model_then_predict_collected() {
    let dir = TempDir::new().unwrap();
    let (earlier, repo) = stub_pipeline(&dir);
    let labeled = write_labeled(&dir, "labeled.csv");

    let pipeline = PipelineOrchestrator::with_parts(
        &config_in(&dir),
        SignalAcquisitionService::with_time_source(
            SerialConfig::default(),
            Arc::new(StubTimeSource::new()),
        ),
        repo.clone(),
    );
    assert!(matches!(
        pipeline.use_current_model(),
        Err(PipelineError::Model(ModelError::NotFound { .. }))
    ));
    assert_eq!(pipeline.state().unwrap(), PipelineState::Idle);

    // A model trained by an earlier session sharing the repository
    earlier
        .train([&labeled], "Content")
        .unwrap()
        .wait()
        .await
        .unwrap();

    let id = pipeline.use_current_model().unwrap();
    assert_eq!(repo.current_id().unwrap(), Some(id));
    assert_eq!(pipeline.state().unwrap(), PipelineState::Trained);

    // Collecting with a model loaded keeps the pipeline ready to predict
    pipeline
        .collect_from(scripted(&["104,98,690", "106,100,692", "63,62,421"]), 1.0)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(pipeline.state().unwrap(), PipelineState::Trained);

    let outcome = pipeline
        .predict(PredictionRequest::Collected {
            mode: PredictionMode::MajorityVote,
        })
        .unwrap()
        .wait()
        .await
        .unwrap();
    match outcome {
        StageOutcome::Predicted(PredictionOutput::Result(PredictionResult::MajorityVote {
            label,
            ..
        })) => assert_eq!(label, "horror"),
        other => panic!("Expected majority vote, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_predict_can_be_invoked_again() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let labeled = write_labeled(&dir, "labeled.csv");
    pipeline
        .train([&labeled], "Content")
        .unwrap()
        .wait()
        .await
        .unwrap();

    let err = pipeline
        .predict(PredictionRequest::File {
            path: dir.path().join("missing.csv"),
            mode: PredictionMode::MajorityVote,
        })
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Dataset(DatasetError::Io { .. })));
    assert_eq!(failed_stage(&pipeline.state().unwrap()), Some(Stage::Predict));

    pipeline
        .predict(PredictionRequest::File {
            path: labeled,
            mode: PredictionMode::Annotate,
        })
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(pipeline.state().unwrap(), PipelineState::Predicted);
}

#[tokio::test]
async fn test_export_and_clear() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let mut rx = pipeline.subscribe();

    assert!(matches!(
        pipeline.export("comedy"),
        Err(PipelineError::Dataset(DatasetError::EmptyDataset))
    ));

    pipeline
        .collect_from(scripted(&["72,70,450", "74,71,455"]), 0.5)
        .unwrap()
        .wait()
        .await
        .unwrap();

    let path = pipeline.export_unlabeled().unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap().lines().next(),
        Some("beatsPerMinute,beatAvg,GSR")
    );
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        PipelineEvent::Log(log) if log.message.starts_with("Data saved to")
    )));

    pipeline.clear_collected().unwrap();
    assert_eq!(pipeline.collected_rows().unwrap(), 0);
}

fn diagnostics(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Log(log) if log.kind == LogKind::Diagnostic => Some(log.message.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_stage_outside_runtime_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let mut rx = pipeline.subscribe();
    let labeled = write_labeled(&dir, "labeled.csv");

    assert!(matches!(
        pipeline.train([&labeled], "Content"),
        Err(PipelineError::RuntimeUnavailable { .. })
    ));
    assert!(matches!(
        pipeline.collect_from(scripted(&["72,70,450"]), 1.0),
        Err(PipelineError::RuntimeUnavailable { .. })
    ));
    assert_eq!(pipeline.state().unwrap(), PipelineState::Idle);

    // Not stuck in a running state
    assert!(matches!(
        pipeline.export("comedy"),
        Err(PipelineError::Dataset(DatasetError::EmptyDataset))
    ));

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::StateChanged { .. })));
    assert!(diagnostics(&events)
        .iter()
        .any(|m| m.starts_with("train refused") && m.contains("outside a tokio runtime")));
}

#[tokio::test]
async fn test_refused_requests_reach_subscribers() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = stub_pipeline(&dir);
    let mut rx = pipeline.subscribe();

    assert!(pipeline.export("comedy").is_err());
    assert!(pipeline.retry().is_err());
    assert!(matches!(
        pipeline.predict(PredictionRequest::Collected {
            mode: PredictionMode::MajorityVote,
        }),
        Err(PipelineError::InvalidTransition { .. })
    ));

    let messages = diagnostics(&drain(&mut rx));
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("export refused"));
    assert!(messages[1].starts_with("retry refused"));
    assert!(messages[2].starts_with("predict refused"));
    assert_eq!(pipeline.state().unwrap(), PipelineState::Idle);
}

#[tokio::test]
async fn test_busy_rejection_is_published() {
    let dir = TempDir::new().unwrap();
    let pipeline = PipelineOrchestrator::with_parts(
        &config_in(&dir),
        SignalAcquisitionService::new(SerialConfig::default()),
        Arc::new(InMemoryModelRepository::new()),
    );
    let mut rx = pipeline.subscribe();
    let source = ScriptedSource::from_lines(["72,70,450"]).with_idle_delay(Duration::from_millis(5));

    let running = pipeline.collect_from(Box::new(source), 0.3).unwrap();
    assert!(matches!(
        pipeline.clear_collected(),
        Err(PipelineError::StageBusy { .. })
    ));
    running.wait().await.unwrap();

    assert!(diagnostics(&drain(&mut rx))
        .iter()
        .any(|m| m.starts_with("clear_collected refused")));
}
