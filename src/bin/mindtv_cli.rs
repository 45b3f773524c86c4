use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mindtv::acquisition::{LogKind, ScriptedSource};
use mindtv::pipeline::{PredictionOutput, StageHandle, StageOutcome};
use mindtv::prediction::{PredictionMode, PredictionResult};
use mindtv::{init_logging, AppConfig, PipelineEvent, PipelineOrchestrator, PredictionRequest};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser, Debug)]
#[command(
    name = "mindtv_cli",
    about = "Collect wearable sensor data, train a content classifier and predict with it"
)]
struct Cli {
    /// JSON config file (defaults to config/mindtv.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record samples from the serial port, optionally exporting them labeled
    Collect {
        #[arg(long)]
        port: String,
        #[arg(long)]
        duration_secs: f64,
        /// Export the collected rows with this constant label
        #[arg(long)]
        label: Option<String>,
    },
    /// Replay a captured serial log as if it came from the sensor
    Replay {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        duration_secs: f64,
        #[arg(long)]
        label: Option<String>,
    },
    /// Train a model on labeled CSV files and make it current
    Train {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Label column (defaults to the configured one)
        #[arg(long)]
        label_column: Option<String>,
    },
    /// Predict the content type of a feature CSV with the current model
    Predict {
        #[arg(long)]
        input: PathBuf,
        /// Write an annotated copy of the input here instead of voting
        #[arg(long)]
        annotate: Option<PathBuf>,
        /// Print the predicted label of every row
        #[arg(long, conflicts_with = "annotate")]
        per_row: bool,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run_command(&config, cli.command))
}

async fn run_command(config: &AppConfig, command: Commands) -> Result<ExitCode> {
    let pipeline = PipelineOrchestrator::new(config);
    match command {
        Commands::Collect {
            port,
            duration_secs,
            label,
        } => {
            let events = pipeline.subscribe();
            let handle = pipeline
                .collect(&port, duration_secs)
                .with_context(|| format!("collecting from {}", port))?;
            finish_collect(&pipeline, events, handle, label).await
        }
        Commands::Replay {
            input,
            duration_secs,
            label,
        } => {
            let source = ScriptedSource::from_file(&input)
                .with_context(|| format!("loading capture {}", input.display()))?
                .with_idle_delay(Duration::from_millis(10));
            let events = pipeline.subscribe();
            let handle = pipeline.collect_from(Box::new(source), duration_secs)?;
            finish_collect(&pipeline, events, handle, label).await
        }
        Commands::Train {
            files,
            label_column,
        } => {
            let label_column = match label_column {
                Some(column) => column,
                None => pipeline.label_column()?,
            };
            let events = pipeline.subscribe();
            let handle = pipeline.train(&files, &label_column)?;
            Ok(exit_code(run_stage(events, handle).await))
        }
        Commands::Predict {
            input,
            annotate,
            per_row,
        } => {
            let model_id = pipeline.use_current_model()?;
            println!("Using model {}", model_id);

            let request = match annotate {
                Some(output) => PredictionRequest::Annotate { input, output },
                None => PredictionRequest::File {
                    path: input,
                    mode: if per_row {
                        PredictionMode::Annotate
                    } else {
                        PredictionMode::MajorityVote
                    },
                },
            };
            let events = pipeline.subscribe();
            let handle = pipeline.predict(request)?;
            Ok(exit_code(run_stage(events, handle).await))
        }
    }
}

fn exit_code(succeeded: bool) -> ExitCode {
    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

async fn finish_collect(
    pipeline: &PipelineOrchestrator,
    events: UnboundedReceiver<PipelineEvent>,
    handle: StageHandle,
    label: Option<String>,
) -> Result<ExitCode> {
    if !run_stage(events, handle).await {
        return Ok(exit_code(false));
    }

    let path = match label {
        Some(label) => pipeline.export(&label)?,
        None => pipeline.export_unlabeled()?,
    };
    println!("Data saved to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Print events until the stage settles, then report whether it succeeded
async fn run_stage(mut events: UnboundedReceiver<PipelineEvent>, handle: StageHandle) -> bool {
    let stage = handle.stage();
    let printer = async {
        while let Some(event) = events.recv().await {
            let settled = matches!(
                event,
                PipelineEvent::StageCompleted { .. } | PipelineEvent::StageFailed { .. }
            );
            print_event(&event);
            if settled {
                break;
            }
        }
    };

    let (outcome, ()) = tokio::join!(handle.wait(), printer);
    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            true
        }
        Err(err) => {
            eprintln!("{} failed: {}", stage, err);
            false
        }
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Log(log) => match log.kind {
            LogKind::Record => println!("{}", log.message),
            LogKind::ParseError => eprintln!("skipped: {}", log.message),
            LogKind::Diagnostic => println!("[{}]", log.message),
        },
        PipelineEvent::Progress(percent) => eprint!("\rprogress {:>3}%", percent),
        PipelineEvent::SampleCount(count) => eprint!("  samples {}", count),
        PipelineEvent::StateChanged { from, to } => {
            eprintln!();
            log::debug!("[CLI] state {} -> {}", from, to);
        }
        PipelineEvent::StageCompleted { .. } | PipelineEvent::StageFailed { .. } => {}
    }
}

fn print_outcome(outcome: &StageOutcome) {
    println!("{}", outcome.summary());
    match outcome {
        StageOutcome::Trained(report) => {
            println!(
                "classes: {} | train rows: {} | test rows: {}",
                report.classes.join(", "),
                report.train_rows,
                report.test_rows
            );
        }
        StageOutcome::Predicted(PredictionOutput::Result(PredictionResult::MajorityVote {
            counts,
            ..
        })) => {
            for (label, count) in counts {
                println!("  {}: {}", label, count);
            }
        }
        StageOutcome::Predicted(PredictionOutput::Result(PredictionResult::Annotated(rows))) => {
            for (sample, label) in rows {
                println!(
                    "{},{},{},{}",
                    sample.beats_per_minute(),
                    sample.beat_avg(),
                    sample.gsr(),
                    label
                );
            }
        }
        StageOutcome::Collected { .. } | StageOutcome::Predicted(PredictionOutput::Annotation(_)) => {}
    }
}
