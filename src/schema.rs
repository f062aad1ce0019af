//! The fixed extraction schema the remote model must return.
//!
//! Field names are the Spanish ones printed on the source requisition forms
//! (Paciente, FechaNacimiento, Sexo, ...). Parsing is lenient: a malformed
//! test line is skipped with a recorded issue instead of failing the whole
//! file.

use serde::{Deserialize, Serialize};

/// Accepted `Sexo` codes. Spanish forms print both M/F and V/H
/// (varón/hembra) depending on the issuing lab.
const SEX_CODES: &[&str] = &["M", "F", "V", "H"];

/// One extracted scalar field: the printed value plus where the model saw it.
///
/// Bounding boxes are produced remotely and carried opaquely; only their
/// shape (`[x0, y0, x1, y1]`) is checked here, never their geometry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
}

impl FieldValue {
    /// True when the model produced a non-empty printed value.
    pub fn is_filled(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// One requested analysis line from the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLine {
    pub description: String,
    #[serde(default)]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
}

/// Urine-collection metadata block (24h collections carry volume and
/// collection-period annotations on the form).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrineCollection {
    #[serde(default)]
    pub recogida_24h: FieldValue,
    #[serde(default)]
    pub volumen_ml: FieldValue,
    #[serde(default)]
    pub tiempo_recogida: FieldValue,
}

/// A fully parsed requisition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requisition {
    #[serde(rename = "Paciente", default)]
    pub paciente: FieldValue,
    #[serde(rename = "FechaNacimiento", default)]
    pub fecha_nacimiento: FieldValue,
    #[serde(rename = "Sexo", default)]
    pub sexo: FieldValue,
    #[serde(rename = "Medico", default)]
    pub medico: FieldValue,
    #[serde(rename = "NumColegiado", default)]
    pub num_colegiado: FieldValue,
    #[serde(default)]
    pub tests: Vec<TestLine>,
    #[serde(default)]
    pub orina: Option<UrineCollection>,
}

/// A non-fatal problem found while validating the model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A required top-level key is absent from the JSON.
    MissingField(&'static str),
    /// `Sexo` carries a value outside the accepted codes.
    UnknownSexCode(String),
    /// `FechaNacimiento` carries a value no accepted date format decodes.
    UndecodableDate(String),
    /// A `tests` entry could not be deserialized and was skipped.
    MalformedTestLine(usize),
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::UnknownSexCode(code) => write!(f, "unrecognized Sexo code '{code}'"),
            Self::UndecodableDate(raw) => {
                write!(f, "FechaNacimiento '{raw}' is not a recognizable date")
            }
            Self::MalformedTestLine(idx) => write!(f, "skipped malformed tests[{idx}]"),
        }
    }
}

/// Required top-level keys; their absence is reported but never fatal.
const REQUIRED_FIELDS: &[&str] = &["Paciente", "FechaNacimiento", "Sexo", "tests"];

impl Requisition {
    /// Parse a requisition out of the model's JSON object, leniently.
    ///
    /// Always succeeds for a JSON object: unknown keys are ignored,
    /// malformed test lines are skipped, and every deviation is recorded
    /// as a [`ValidationIssue`].
    pub fn from_value(value: &serde_json::Value) -> (Self, Vec<ValidationIssue>) {
        let mut issues = Vec::new();

        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                issues.extend(REQUIRED_FIELDS.iter().map(|f| ValidationIssue::MissingField(f)));
                return (Self::default(), issues);
            }
        };

        for field in REQUIRED_FIELDS {
            if !obj.contains_key(*field) {
                issues.push(ValidationIssue::MissingField(field));
            }
        }

        let scalar = |key: &str| -> FieldValue {
            obj.get(key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        };

        let mut tests = Vec::new();
        if let Some(raw_tests) = obj.get("tests").and_then(|v| v.as_array()) {
            for (idx, raw) in raw_tests.iter().enumerate() {
                match serde_json::from_value::<TestLine>(raw.clone()) {
                    Ok(line) => tests.push(line),
                    Err(_) => issues.push(ValidationIssue::MalformedTestLine(idx)),
                }
            }
        }

        let orina = obj
            .get("orina")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let requisition = Self {
            paciente: scalar("Paciente"),
            fecha_nacimiento: scalar("FechaNacimiento"),
            sexo: scalar("Sexo"),
            medico: scalar("Medico"),
            num_colegiado: scalar("NumColegiado"),
            tests,
            orina,
        };

        if let Some(code) = requisition.sexo.value.as_deref() {
            let trimmed = code.trim();
            if !trimmed.is_empty() && !SEX_CODES.contains(&trimmed.to_uppercase().as_str()) {
                issues.push(ValidationIssue::UnknownSexCode(trimmed.to_string()));
            }
        }

        if let Some(raw) = requisition.fecha_nacimiento.value.as_deref() {
            let trimmed = raw.trim();
            if !trimmed.is_empty() && !decodes_as_date(trimmed) {
                issues.push(ValidationIssue::UndecodableDate(trimmed.to_string()));
            }
        }

        (requisition, issues)
    }
}

/// Date formats seen on the source forms, day-first Spanish conventions
/// plus ISO.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];

fn decodes_as_date(raw: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|format| chrono::NaiveDate::parse_from_str(raw, format).is_ok())
}

/// Extraction statistics for the console summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldStats {
    /// Top-level fields present in the answer.
    pub total: usize,
    /// Fields carrying a usable (non-null, non-empty) value.
    pub extracted: usize,
}

impl FieldStats {
    /// Success rate in percent, `None` when nothing was present.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.extracted as f64 / self.total as f64 * 100.0)
    }
}

/// Count total vs usable top-level fields in the raw answer.
///
/// Mirrors what a reviewer sees: a field counts as extracted when it is not
/// null, not an empty string/array, and (for `{value, bounding_box}` objects)
/// carries a non-empty `value`.
pub fn field_stats(value: &serde_json::Value) -> FieldStats {
    let Some(obj) = value.as_object() else {
        return FieldStats::default();
    };

    let mut stats = FieldStats { total: obj.len(), extracted: 0 };
    for v in obj.values() {
        let filled = match v {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(inner) => match inner.get("value") {
                // {value, bounding_box} scalars count by their value
                Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
                Some(serde_json::Value::Null) => false,
                Some(_) => true,
                // Nested blocks (orina) count when any member is filled
                None => !inner.is_empty(),
            },
            _ => true,
        };
        if filled {
            stats.extracted += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_answer() -> serde_json::Value {
        json!({
            "Paciente": {"value": "GARCIA LOPEZ, MARIA", "bounding_box": [56.0, 112.5, 240.0, 126.0]},
            "FechaNacimiento": {"value": "03/07/1961", "bounding_box": [56.0, 130.0, 128.0, 142.0]},
            "Sexo": {"value": "M", "bounding_box": null},
            "Medico": {"value": "DR. ECHEVARRIA", "bounding_box": [300.0, 112.5, 420.0, 126.0]},
            "NumColegiado": {"value": "282834455", "bounding_box": null},
            "tests": [
                {"description": "Hemograma completo", "sample_type": "sangre total", "bounding_box": [56.0, 300.0, 200.0, 312.0]},
                {"description": "Creatinina", "sample_type": "suero", "bounding_box": null}
            ],
            "orina": {
                "recogida_24h": {"value": "true", "bounding_box": null},
                "volumen_ml": {"value": "1850", "bounding_box": null},
                "tiempo_recogida": {"value": "24h", "bounding_box": null}
            }
        })
    }

    #[test]
    fn parse_full_answer() {
        let (req, issues) = Requisition::from_value(&full_answer());
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        assert_eq!(req.paciente.value.as_deref(), Some("GARCIA LOPEZ, MARIA"));
        assert_eq!(req.fecha_nacimiento.value.as_deref(), Some("03/07/1961"));
        assert_eq!(req.tests.len(), 2);
        assert_eq!(req.tests[1].sample_type.as_deref(), Some("suero"));
        let orina = req.orina.expect("orina block");
        assert_eq!(orina.volumen_ml.value.as_deref(), Some("1850"));
    }

    #[test]
    fn missing_fields_are_reported_not_fatal() {
        let (req, issues) = Requisition::from_value(&json!({"Paciente": {"value": "X"}}));
        assert_eq!(req.paciente.value.as_deref(), Some("X"));
        assert!(issues.contains(&ValidationIssue::MissingField("FechaNacimiento")));
        assert!(issues.contains(&ValidationIssue::MissingField("Sexo")));
        assert!(issues.contains(&ValidationIssue::MissingField("tests")));
    }

    #[test]
    fn non_object_answer_reports_all_required() {
        let (req, issues) = Requisition::from_value(&json!([1, 2, 3]));
        assert!(req.paciente.value.is_none());
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn malformed_test_line_is_skipped() {
        let (req, issues) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": "01/01/1990"},
            "Sexo": {"value": "F"},
            "tests": [
                {"description": "Glucosa", "sample_type": "suero"},
                {"no_description": true},
                "not even an object"
            ]
        }));
        assert_eq!(req.tests.len(), 1);
        assert!(issues.contains(&ValidationIssue::MalformedTestLine(1)));
        assert!(issues.contains(&ValidationIssue::MalformedTestLine(2)));
    }

    #[test]
    fn unknown_sex_code_flagged() {
        let (_, issues) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": "01/01/1990"},
            "Sexo": {"value": "X"},
            "tests": []
        }));
        assert!(issues.contains(&ValidationIssue::UnknownSexCode("X".into())));
    }

    #[test]
    fn lowercase_sex_code_accepted() {
        let (_, issues) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": "01/01/1990"},
            "Sexo": {"value": "f"},
            "tests": []
        }));
        assert!(!issues.iter().any(|i| matches!(i, ValidationIssue::UnknownSexCode(_))));
    }

    #[test]
    fn undecodable_birth_date_flagged() {
        let (req, issues) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": "julio del 61"},
            "Sexo": {"value": "F"},
            "tests": []
        }));
        assert_eq!(req.fecha_nacimiento.value.as_deref(), Some("julio del 61"));
        assert!(issues.contains(&ValidationIssue::UndecodableDate("julio del 61".into())));
    }

    #[test]
    fn common_date_formats_accepted() {
        for date in ["03/07/1961", "03-07-1961", "03.07.1961", "1961-07-03"] {
            let (_, issues) = Requisition::from_value(&json!({
                "Paciente": {"value": "X"},
                "FechaNacimiento": {"value": date},
                "Sexo": {"value": "F"},
                "tests": []
            }));
            assert!(
                !issues.iter().any(|i| matches!(i, ValidationIssue::UndecodableDate(_))),
                "{date} should decode"
            );
        }
    }

    #[test]
    fn absent_birth_date_is_not_an_undecodable_date() {
        let (_, issues) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": null},
            "Sexo": {"value": "F"},
            "tests": []
        }));
        assert!(!issues.iter().any(|i| matches!(i, ValidationIssue::UndecodableDate(_))));
    }

    #[test]
    fn null_orina_is_absent() {
        let (req, _) = Requisition::from_value(&json!({
            "Paciente": {"value": "X"},
            "FechaNacimiento": {"value": "01/01/1990"},
            "Sexo": {"value": "M"},
            "tests": [],
            "orina": null
        }));
        assert!(req.orina.is_none());
    }

    #[test]
    fn field_value_filled() {
        assert!(FieldValue { value: Some("x".into()), bounding_box: None }.is_filled());
        assert!(!FieldValue { value: Some("  ".into()), bounding_box: None }.is_filled());
        assert!(!FieldValue::default().is_filled());
    }

    #[test]
    fn stats_count_filled_fields() {
        let stats = field_stats(&full_answer());
        assert_eq!(stats.total, 7);
        assert_eq!(stats.extracted, 7);
    }

    #[test]
    fn stats_ignore_null_and_empty() {
        let stats = field_stats(&json!({
            "Paciente": {"value": null, "bounding_box": null},
            "Sexo": {"value": "M"},
            "Medico": null,
            "tests": []
        }));
        assert_eq!(stats.total, 4);
        assert_eq!(stats.extracted, 1);
        let rate = stats.success_rate().unwrap();
        assert!((rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_on_non_object_are_zero() {
        let stats = field_stats(&json!("just text"));
        assert_eq!(stats, FieldStats::default());
        assert!(stats.success_rate().is_none());
    }

    #[test]
    fn requisition_round_trips_through_serde() {
        let (req, _) = Requisition::from_value(&full_answer());
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded["Paciente"]["value"], "GARCIA LOPEZ, MARIA");
        assert_eq!(encoded["tests"][0]["description"], "Hemograma completo");
    }
}
