//! Lab document loading with schema validation and lint.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::expr::Limits;
use crate::core::lint::{LintReport, lint_lab};
use crate::lab::LabDocument;

const LAB_SCHEMA: &str = include_str!("../../schemas/lab.schema.json");

/// A parsed lab plus its soft authoring issues.
#[derive(Debug, Clone)]
pub struct LoadedLab {
    pub doc: LabDocument,
    pub lint: LintReport,
}

/// Read, schema-check, deserialize and lint a lab document.
pub fn load_lab(path: &Path, limits: &Limits) -> Result<LoadedLab> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read lab {}", path.display()))?;
    let loaded = parse_lab(&contents, limits).with_context(|| format!("load lab {}", path.display()))?;
    debug!(
        path = %path.display(),
        lab = %loaded.doc.lab.id,
        steps = loaded.doc.lab.steps.len(),
        lint_errors = loaded.lint.errors.len(),
        "loaded lab"
    );
    Ok(loaded)
}

/// Same as [`load_lab`] for an in-memory JSON document.
pub fn parse_lab(contents: &str, limits: &Limits) -> Result<LoadedLab> {
    let value: Value = serde_json::from_str(contents).context("parse lab json")?;
    validate_schema(&value)?;
    let doc: LabDocument = serde_json::from_value(value).context("deserialize lab")?;
    let lint = lint_lab(&doc, limits);
    Ok(LoadedLab { doc, lint })
}

/// Validate a lab document against the bundled JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(LAB_SCHEMA).context("parse bundled lab schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile lab schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "schema_version": 1,
        "lab": {
            "id": "mini",
            "steps": [
                {"id": "q", "type": "quiz", "choices": [{"id": "a"}], "correct": "a"}
            ]
        }
    }"#;

    #[test]
    fn loads_valid_lab_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lab.json");
        fs::write(&path, MINIMAL).expect("write");
        let loaded = load_lab(&path, &Limits::default()).expect("load");
        assert_eq!(loaded.doc.lab.id, "mini");
        assert!(loaded.lint.is_clean(), "{:?}", loaded.lint.errors);
    }

    #[test]
    fn schema_violations_are_reported() {
        let err = parse_lab(r#"{"lab": {"id": "x", "steps": [{"id": "s", "type": "video"}]}}"#, &Limits::default())
            .expect_err("invalid step type");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn shapes_serde_needs_are_schema_errors() {
        let cases = [
            r#"{"lab": {"id": "x", "steps": [{"id": "t", "type": "terminal",
                "world_patch": [{"op": "set", "path": "vpc.id"}]}]}}"#,
            r#"{"lab": {"id": "x", "variables": {"n": {"type": "number", "min": 1}},
                "steps": [{"id": "q", "type": "quiz", "choices": [{"id": "a"}], "correct": "a"}]}}"#,
            r#"{"lab": {"id": "x", "steps": [{"id": "t", "type": "terminal",
                "validators": [{"kind": "expression"}]}]}}"#,
            r#"{"lab": {"id": "x", "steps": [{"id": "t", "type": "terminal",
                "terminal": {"validators": [{"response": "no match block"}]}}]}}"#,
        ];
        for case in cases {
            let err = parse_lab(case, &Limits::default()).expect_err("schema violation");
            let message = format!("{err:#}");
            assert!(message.contains("schema validation failed"), "{message}");
        }
    }

    #[test]
    fn patch_without_value_is_fine_for_unset_and_remove() {
        let loaded = parse_lab(
            r#"{"lab": {"id": "x", "steps": [{"id": "q", "type": "quiz",
                "choices": [{"id": "a"}], "correct": "a",
                "world_patch": [{"op": "unset", "path": "a"}, {"op": "remove", "path": "b"}]}]}}"#,
            &Limits::default(),
        )
        .expect("load");
        assert_eq!(loaded.doc.lab.steps[0].world_patch.len(), 2);
    }

    #[test]
    fn missing_file_has_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_lab(&temp.path().join("nope.json"), &Limits::default()).expect_err("missing");
        assert!(err.to_string().contains("read lab"));
    }

    #[test]
    fn lint_issues_do_not_fail_loading() {
        let loaded = parse_lab(
            r#"{"lab": {"id": "x", "steps": [{"id": "t", "type": "terminal"}]}}"#,
            &Limits::default(),
        )
        .expect("load");
        assert!(!loaded.lint.is_clean());
    }
}
