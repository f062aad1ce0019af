use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use requiscan::batch::{self, BatchOptions};
use requiscan::cli::{self, Cli};
use requiscan::config::{self, Settings};
use requiscan::processor::{AnyProcessor, ExtractionRequest, GenAiProcessor};
use requiscan::report;

/// Console output plus a daily-rotating file under `logs/`.
///
/// The returned guard must stay alive for the process lifetime or buffered
/// file output is lost.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(config::log_dir(), config::APP_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(message) => {
            tracing::error!("{message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let settings = Settings::from_env().map_err(|e| e.to_string())?;

    if cli.list_remote || cli.cleanup_remote {
        return remote_maintenance(&cli, &settings).await;
    }

    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut writer = std::io::stdout();

    let kind = cli::resolve_processor(cli.processor.as_deref(), &mut reader, &mut writer)
        .map_err(|e| e.to_string())?;

    let model = match &cli.model {
        Some(model) => model.clone(),
        None => match cli::prompt_model(&mut reader, &mut writer, kind)
            .map_err(|e| e.to_string())?
        {
            Some(model) => model,
            None => {
                writeln!(writer, "Nothing to do.").ok();
                return Ok(ExitCode::SUCCESS);
            }
        },
    };

    let streaming = if cli.no_stream {
        false
    } else if cli.model.is_some() {
        // Fully scripted invocations keep the default without prompting.
        true
    } else {
        cli::prompt_streaming(&mut reader, &mut writer).map_err(|e| e.to_string())?
    };

    let input_dir = cli.input.clone().unwrap_or_else(|| settings.input_dir.clone());
    let files = batch::find_pdf_files(&input_dir).map_err(|e| e.to_string())?;
    if files.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no PDF files found, nothing to process");
        report::print_batch_summary(&report::BatchSummary::default());
        return Ok(ExitCode::SUCCESS);
    }

    let processor = AnyProcessor::build(kind, &settings).map_err(|e| e.to_string())?;
    let request = ExtractionRequest { model, streaming };
    let options = BatchOptions {
        max_workers: settings.max_workers,
        show_progress: !cli.quiet,
        quiet: cli.quiet,
    };

    let (_, summary) = batch::run_batch(&processor, &files, &request, &options).await;
    report::print_batch_summary(&summary);

    if summary.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// `--list-remote` / `--cleanup-remote`: Files API housekeeping.
async fn remote_maintenance(cli: &Cli, settings: &Settings) -> Result<ExitCode, String> {
    let processor = GenAiProcessor::new(settings).map_err(|e| e.to_string())?;

    if cli.list_remote {
        let files = processor.list_remote_files().await.map_err(|e| e.to_string())?;
        if files.is_empty() {
            println!("No files held remotely.");
        } else {
            for (name, display_name) in &files {
                match display_name {
                    Some(label) => println!("{name}  ({label})"),
                    None => println!("{name}"),
                }
            }
            println!("{} file(s) held remotely.", files.len());
        }
    }

    if cli.cleanup_remote {
        let deleted = processor.cleanup_remote_files().await.map_err(|e| e.to_string())?;
        println!("Deleted {deleted} remote file(s).");
    }

    Ok(ExitCode::SUCCESS)
}
