//! Batch orchestration.
//!
//! One shared processor instance serves the whole run. Files are driven
//! through `buffer_unordered`, so at most `max_workers` provider round-trips
//! are in flight at once and one failed file never stops the rest.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use futures_util::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output;
use crate::processor::{DocumentProcessor, ExtractionRequest, PdfFile};
use crate::report::{self, BatchSummary, FileReport, FileSuccess};
use crate::response::ModelReply;
use crate::schema::{self, Requisition};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("input directory not found: {0}")]
    InputDirMissing(PathBuf),

    #[error("cannot read input directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub show_progress: bool,
    /// Suppress per-file summary blocks.
    pub quiet: bool,
}

/// All PDF files directly under `dir`, sorted by name.
pub fn find_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::InputDirMissing(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir).map_err(|source| BatchError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Run one file end to end: validate, extract, parse, persist.
async fn process_file<P: DocumentProcessor>(
    processor: &P,
    path: &Path,
    request: &ExtractionRequest,
) -> FileReport {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();

    let result = async {
        let pdf = PdfFile::open(path).map_err(|e| e.to_string())?;
        let outcome = processor
            .extract(&pdf, request)
            .await
            .map_err(|e| e.to_string())?;

        let reply = ModelReply::parse(&outcome.raw_reply);
        let artifact = reply.artifact();
        let artifact_path =
            output::artifact_path(pdf.path(), processor.kind(), &request.model, Local::now());
        output::write_artifact(&artifact_path, &artifact).map_err(|e| e.to_string())?;

        let (structured, stats, requisition, issues) = match reply.as_structured() {
            Some(value) => {
                let (requisition, issues) = Requisition::from_value(value);
                (true, schema::field_stats(value), requisition, issues)
            }
            None => (false, Default::default(), Requisition::default(), Vec::new()),
        };

        Ok(FileSuccess {
            artifact_path,
            elapsed: outcome.elapsed,
            usage: outcome.usage,
            structured,
            stats,
            requisition,
            issues,
        })
    }
    .await;

    if let Err(message) = &result {
        tracing::error!(file = %file_name, error = %message, "file processing failed");
    }

    FileReport {
        file_name,
        model: request.model.clone(),
        result,
    }
}

/// Process every file with bounded concurrency.
pub async fn run_batch<P: DocumentProcessor>(
    processor: &P,
    files: &[PathBuf],
    request: &ExtractionRequest,
    options: &BatchOptions,
) -> (Vec<FileReport>, BatchSummary) {
    let started = Instant::now();
    tracing::info!(
        files = files.len(),
        workers = options.max_workers,
        model = %request.model,
        "starting batch"
    );

    let progress = if options.show_progress {
        let bar = ProgressBar::new(files.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        Some(bar)
    } else {
        None
    };

    let reports: Vec<FileReport> = stream::iter(files.iter())
        .map(|path| process_file(processor, path, request))
        .buffer_unordered(options.max_workers.max(1))
        .map(|report| {
            if let Some(bar) = &progress {
                bar.inc(1);
                bar.set_message(report.file_name.clone());
                if !options.quiet {
                    bar.suspend(|| report::print_file_report(&report));
                }
            } else if !options.quiet {
                report::print_file_report(&report);
            }
            report
        })
        .collect()
        .await;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let succeeded = reports.iter().filter(|r| r.result.is_ok()).count();
    let summary = BatchSummary {
        processed: reports.len(),
        succeeded,
        failed: reports.len() - succeeded,
        total_elapsed: started.elapsed(),
    };
    tracing::info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "batch finished"
    );
    (reports, summary)
}
