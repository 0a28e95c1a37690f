use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use exam_core::app::StagingKind;
use exam_core::domain::ExamError;
use exam_core::impls::{ChannelSink, InProcessProvisioner};
use exam_core::ports::{SystemClock, UlidGenerator};
use exam_core::{ExamRunner, ExamSettings};

mod demo;
mod greeter;

/// Stage the greeter demo under every configuration and print one JSON line
/// per run event.
#[derive(Debug, Parser)]
#[command(name = "exam", version)]
struct Args {
    /// Settings file (`exam.toml`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Provision environments concurrently and let invocations overlap.
    #[arg(long)]
    pooled: bool,

    #[arg(long, default_value_t = 2, requires = "pooled")]
    max_parallel: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG で上書き可能。stdout はイベント出力に使うのでログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!(error = %err, "exam run aborted");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<bool, ExamError> {
    let mut settings = match &args.settings {
        Some(path) => ExamSettings::load(path)?,
        None => ExamSettings::default(),
    };
    if args.pooled {
        settings.run.staging = StagingKind::Pooled;
        settings.run.max_parallel = Some(args.max_parallel);
        settings.validate()?;
    }

    let catalog = demo::catalog().map_err(|err| ExamError::Configuration(err.to_string()))?;
    let provisioner = Arc::new(InProcessProvisioner::new(
        Arc::new(catalog),
        Arc::new(UlidGenerator::new(SystemClock)),
    ));
    let runner = ExamRunner::new(provisioner, settings.clone());

    // (A) イベントを JSON 行で stdout に流す
    let (sink, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to encode run event"),
            }
        }
    });

    // (B) 実行。sink は run の終了と同時に drop され、printer も終わる
    let result = runner.run(&demo::GreeterTest, &settings, Arc::new(sink)).await;
    if let Err(err) = printer.await {
        warn!(error = %err, "event printer stopped early");
    }

    Ok(result?.all_passed())
}
