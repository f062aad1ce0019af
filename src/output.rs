//! Artifact persistence.
//!
//! One JSON artifact per input PDF, written next to the input. The name
//! encodes provenance: input stem, processor, model, and a timestamp, so
//! repeated runs never clobber each other.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::processor::ProcessorKind;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("cannot write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize artifact for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Sibling path for the artifact of one extraction.
///
/// `{stem}-{processor}-{safe_model}-{yyyyMMdd_HHMMSS}.json`, where the model
/// id has its slashes flattened to dashes.
pub fn artifact_path(
    pdf_path: &Path,
    kind: ProcessorKind,
    model: &str,
    timestamp: DateTime<Local>,
) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let safe_model = model.replace('/', "-");
    let name = format!(
        "{stem}-{kind}-{safe_model}-{}.json",
        timestamp.format("%Y%m%d_%H%M%S")
    );
    pdf_path.with_file_name(name)
}

/// Write the artifact as pretty-printed UTF-8 JSON.
pub fn write_artifact(path: &Path, artifact: &serde_json::Value) -> Result<(), OutputError> {
    let body = serde_json::to_string_pretty(artifact).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 26, 14, 30, 5).unwrap()
    }

    #[test]
    fn artifact_name_encodes_provenance() {
        let path = artifact_path(
            Path::new("/data/input/peticion_001.pdf"),
            ProcessorKind::GenAi,
            "gemini-flash-latest",
            ts(),
        );
        assert_eq!(
            path,
            Path::new("/data/input/peticion_001-genai-gemini-flash-latest-20260826_143005.json")
        );
    }

    #[test]
    fn model_slashes_become_dashes() {
        let path = artifact_path(
            Path::new("scan.pdf"),
            ProcessorKind::Requesty,
            "google/gemini-2.5-pro",
            ts(),
        );
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "scan-requesty-google-gemini-2.5-pro-20260826_143005.json"
        );
    }

    #[test]
    fn artifact_lands_next_to_input() {
        let path = artifact_path(
            Path::new("/somewhere/deep/req.pdf"),
            ProcessorKind::GenAi,
            "m",
            ts(),
        );
        assert_eq!(path.parent(), Some(Path::new("/somewhere/deep")));
    }

    #[test]
    fn write_artifact_produces_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let artifact = serde_json::json!({ "Paciente": { "value": "García, Ana" } });

        write_artifact(&path, &artifact).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"Paciente\""));
        assert!(written.contains('\n'), "expected pretty-printed output");
        let round: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(round, artifact);
    }

    #[test]
    fn write_artifact_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = write_artifact(&path, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, OutputError::Write { .. }));
    }
}
