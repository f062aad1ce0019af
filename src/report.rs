//! Console reporting.
//!
//! Renders one summary block per processed file and a closing batch summary.
//! Colors apply only when stdout is a terminal.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use crate::processor::TokenUsage;
use crate::schema::{FieldStats, Requisition, ValidationIssue};

/// Outcome of one file in a batch.
#[derive(Debug)]
pub struct FileReport {
    pub file_name: String,
    pub model: String,
    pub result: Result<FileSuccess, String>,
}

#[derive(Debug)]
pub struct FileSuccess {
    pub artifact_path: PathBuf,
    pub elapsed: Duration,
    pub usage: Option<TokenUsage>,
    /// Whether the reply parsed as JSON at all.
    pub structured: bool,
    pub stats: FieldStats,
    pub requisition: Requisition,
    pub issues: Vec<ValidationIssue>,
}

/// Whole-batch accounting.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_elapsed: Duration,
}

// ──────────────────────────────────────────────
// Rendering
// ──────────────────────────────────────────────

struct Style {
    enabled: bool,
}

impl Style {
    fn detect() -> Self {
        Self { enabled: std::io::stdout().is_terminal() }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    fn green(&self, text: &str) -> String {
        self.paint("32", text)
    }

    fn red(&self, text: &str) -> String {
        self.paint("31", text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint("33", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

/// `12.34s` under a minute, `2m 03.45s` above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        let minutes = (secs / 60.0).floor() as u64;
        format!("{minutes}m {:05.2}s", secs - minutes as f64 * 60.0)
    }
}

fn field_or_dash(field: &crate::schema::FieldValue) -> String {
    field.value.clone().unwrap_or_else(|| "-".to_string())
}

/// Print the summary block for one processed file.
pub fn print_file_report(report: &FileReport) {
    let style = Style::detect();

    println!();
    println!("{}", style.bold(&format!("══ {} ══", report.file_name)));
    println!("  model:    {}", report.model);

    let success = match &report.result {
        Ok(success) => success,
        Err(message) => {
            println!("  status:   {}", style.red("FAILED"));
            println!("  error:    {message}");
            return;
        }
    };

    println!("  status:   {}", style.green("OK"));
    println!("  output:   {}", success.artifact_path.display());
    println!("  time:     {}", format_elapsed(success.elapsed));

    if let Some(usage) = &success.usage {
        let mut line = format!(
            "  tokens:   {} prompt / {} completion / {} total",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
        if let Some(cost) = usage.cost {
            line.push_str(&format!(" (${cost:.4})"));
        }
        println!("{line}");
    }

    if !success.structured {
        println!(
            "  fields:   {}",
            style.yellow("reply was not valid JSON, raw text saved")
        );
        return;
    }

    let stats = &success.stats;
    println!(
        "  fields:   {}/{} extracted ({:.0}%)",
        stats.extracted,
        stats.total,
        stats.success_rate().unwrap_or(0.0)
    );

    let req = &success.requisition;
    println!("  patient:  {}", field_or_dash(&req.paciente));
    println!("  born:     {}", field_or_dash(&req.fecha_nacimiento));
    println!("  sex:      {}", field_or_dash(&req.sexo));

    for test in req.tests.iter().take(3) {
        println!("  test:     {}", style.dim(&test.description));
    }
    if req.tests.len() > 3 {
        println!("  test:     {}", style.dim(&format!("… and {} more", req.tests.len() - 3)));
    }

    for issue in &success.issues {
        println!("  warning:  {}", style.yellow(&issue.to_string()));
    }
}

/// Print the closing line for the whole run.
pub fn print_batch_summary(summary: &BatchSummary) {
    let style = Style::detect();
    println!();
    let verdict = if summary.failed == 0 {
        style.green("all succeeded")
    } else {
        style.red(&format!("{} failed", summary.failed))
    };
    println!(
        "{} {} files in {} ({} succeeded, {verdict})",
        style.bold("Batch finished:"),
        summary.processed,
        format_elapsed(summary.total_elapsed),
        summary.succeeded,
    );
}
