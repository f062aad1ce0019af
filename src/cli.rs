//! Command line surface.
//!
//! Every choice can come from a flag; whatever is missing is asked for
//! interactively. The prompt functions are generic over their reader and
//! writer so the menu flow is testable without a terminal.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::config;
use crate::processor::ProcessorKind;

#[derive(Debug, Parser)]
#[command(
    name = config::APP_NAME,
    version = config::APP_VERSION,
    about = "Extract structured clinical fields from scanned lab requisition PDFs"
)]
pub struct Cli {
    /// Processor to use: 1/genai or 2/requesty. Asked interactively when omitted.
    #[arg(short, long)]
    pub processor: Option<String>,

    /// Model id from the processor's catalog, or any custom id.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory holding the input PDFs.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Disable response streaming.
    #[arg(long)]
    pub no_stream: bool,

    /// Suppress per-file summary blocks.
    #[arg(short, long)]
    pub quiet: bool,

    /// List files still held remotely by the GenAI Files API, then exit.
    #[arg(long)]
    pub list_remote: bool,

    /// Delete every file held remotely by the GenAI Files API, then exit.
    #[arg(long)]
    pub cleanup_remote: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("input closed before a choice was made")]
    InputClosed,

    #[error("'{0}' is not a known processor (use 1/genai or 2/requesty)")]
    UnknownProcessor(String),
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, CliError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(CliError::InputClosed);
    }
    Ok(line.trim().to_string())
}

/// Ask which processor to use. Re-asks on invalid input.
pub fn prompt_processor<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<ProcessorKind, CliError> {
    loop {
        writeln!(writer, "\nSelect a processor:")?;
        writeln!(writer, "  1) genai     (Google Generative Language API)")?;
        writeln!(writer, "  2) requesty  (Requesty router)")?;
        write!(writer, "> ")?;
        writer.flush()?;

        let answer = read_line(reader)?;
        match ProcessorKind::parse(&answer) {
            Some(kind) => return Ok(kind),
            None => writeln!(writer, "'{answer}' is not an option.")?,
        }
    }
}

/// Ask which model to run. `Ok(None)` means the user chose to exit.
///
/// Accepts a catalog number, or `exit`/`quit` to abort.
pub fn prompt_model<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    kind: ProcessorKind,
) -> Result<Option<String>, CliError> {
    let catalog = kind.catalog();
    loop {
        writeln!(writer, "\nModels for {kind}:")?;
        for (key, model) in catalog {
            writeln!(writer, "  {key}) {model}")?;
        }
        write!(writer, "Choose a model (or 'exit'): ")?;
        writer.flush()?;

        let answer = read_line(reader)?;
        let lowered = answer.to_lowercase();
        if lowered == "exit" || lowered == "quit" {
            return Ok(None);
        }
        match catalog.iter().find(|(key, _)| *key == answer) {
            Some((_, model)) => return Ok(Some(model.to_string())),
            None => writeln!(writer, "'{answer}' is not an option.")?,
        }
    }
}

/// Ask whether to stream responses. Default is yes.
pub fn prompt_streaming<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<bool, CliError> {
    write!(writer, "\nStream responses? [Y/n]: ")?;
    writer.flush()?;
    let answer = read_line(reader)?.to_lowercase();
    Ok(!answer.starts_with('n'))
}

/// Resolve the processor from the flag, or interactively when absent.
pub fn resolve_processor<R: BufRead, W: Write>(
    flag: Option<&str>,
    reader: &mut R,
    writer: &mut W,
) -> Result<ProcessorKind, CliError> {
    match flag {
        Some(value) => {
            ProcessorKind::parse(value).ok_or_else(|| CliError::UnknownProcessor(value.to_string()))
        }
        None => prompt_processor(reader, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_processor_prompt(input: &str) -> Result<ProcessorKind, CliError> {
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        prompt_processor(&mut reader, &mut out)
    }

    #[test]
    fn processor_menu_accepts_number_and_name() {
        assert_eq!(run_processor_prompt("1\n").unwrap(), ProcessorKind::GenAi);
        assert_eq!(run_processor_prompt("requesty\n").unwrap(), ProcessorKind::Requesty);
    }

    #[test]
    fn processor_menu_reasks_on_garbage() {
        assert_eq!(run_processor_prompt("7\nbanana\n2\n").unwrap(), ProcessorKind::Requesty);
    }

    #[test]
    fn processor_menu_errors_on_eof() {
        assert!(matches!(run_processor_prompt(""), Err(CliError::InputClosed)));
    }

    #[test]
    fn model_menu_returns_model_id_not_menu_key() {
        let mut reader = Cursor::new(b"1\n".to_vec());
        let mut out = Vec::new();
        let model = prompt_model(&mut reader, &mut out, ProcessorKind::GenAi)
            .unwrap()
            .unwrap();
        assert_eq!(model, "gemini-3-pro-preview");
        assert_ne!(model, "1", "the menu key must never leak out as a model id");
    }

    #[test]
    fn model_menu_maps_every_key_to_its_model() {
        for (key, expected) in ProcessorKind::Requesty.catalog() {
            let mut reader = Cursor::new(format!("{key}\n").into_bytes());
            let mut out = Vec::new();
            let model = prompt_model(&mut reader, &mut out, ProcessorKind::Requesty)
                .unwrap()
                .unwrap();
            assert_eq!(model, *expected);
        }
    }

    #[test]
    fn model_menu_honors_exit_and_quit() {
        for word in ["exit\n", "quit\n", "EXIT\n"] {
            let mut reader = Cursor::new(word.as_bytes().to_vec());
            let mut out = Vec::new();
            let choice = prompt_model(&mut reader, &mut out, ProcessorKind::Requesty).unwrap();
            assert!(choice.is_none());
        }
    }

    #[test]
    fn model_menu_rejects_out_of_range_then_accepts() {
        let count = ProcessorKind::Requesty.catalog().len();
        let input = format!("{}\n2\n", count + 5);
        let mut reader = Cursor::new(input.into_bytes());
        let mut out = Vec::new();
        let model = prompt_model(&mut reader, &mut out, ProcessorKind::Requesty)
            .unwrap()
            .unwrap();
        assert_eq!(model, ProcessorKind::Requesty.catalog()[1].1);
    }

    #[test]
    fn model_menu_lists_every_catalog_entry() {
        let mut reader = Cursor::new(b"exit\n".to_vec());
        let mut out = Vec::new();
        prompt_model(&mut reader, &mut out, ProcessorKind::Requesty).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        for (_, model) in ProcessorKind::Requesty.catalog() {
            assert!(rendered.contains(model), "menu is missing {model}");
        }
    }

    #[test]
    fn streaming_defaults_to_yes() {
        for input in ["\n", "y\n", "yes\n", "whatever\n"] {
            let mut reader = Cursor::new(input.as_bytes().to_vec());
            let mut out = Vec::new();
            assert!(prompt_streaming(&mut reader, &mut out).unwrap(), "input {input:?}");
        }
    }

    #[test]
    fn streaming_no_variants_disable() {
        for input in ["n\n", "no\n", "N\n"] {
            let mut reader = Cursor::new(input.as_bytes().to_vec());
            let mut out = Vec::new();
            assert!(!prompt_streaming(&mut reader, &mut out).unwrap(), "input {input:?}");
        }
    }

    #[test]
    fn resolve_processor_prefers_flag() {
        let mut reader = Cursor::new(Vec::new());
        let mut out = Vec::new();
        let kind = resolve_processor(Some("genai"), &mut reader, &mut out).unwrap();
        assert_eq!(kind, ProcessorKind::GenAi);
        assert!(out.is_empty(), "no prompt expected when the flag is set");
    }

    #[test]
    fn resolve_processor_rejects_unknown_flag() {
        let mut reader = Cursor::new(Vec::new());
        let mut out = Vec::new();
        assert!(matches!(
            resolve_processor(Some("llamacpp"), &mut reader, &mut out),
            Err(CliError::UnknownProcessor(_))
        ));
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "requiscan",
            "--processor",
            "requesty",
            "--model",
            "openai/gpt-4o",
            "--input",
            "scans",
            "--no-stream",
            "--quiet",
        ]);
        assert_eq!(cli.processor.as_deref(), Some("requesty"));
        assert_eq!(cli.model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(cli.input.as_deref(), Some(std::path::Path::new("scans")));
        assert!(cli.no_stream);
        assert!(cli.quiet);
        assert!(!cli.list_remote);
    }

    #[test]
    fn cli_verifies_clap_contract() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
