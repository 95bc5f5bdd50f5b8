//! SARIF (Static Analysis Results Interchange Format) output.
//!
//! Generates SARIF 2.1.0 documents from `processing_rules` authoring errors
//! so editors and GitHub Code Scanning can surface them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use quizrules_core::RuleError;

const RULE_INVALID: &str = "invalid-processing-rules";
const RULE_UNREADABLE: &str = "unreadable-questionnaire";

/// Validation findings for one questionnaire file.
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    pub path: PathBuf,
    pub questionnaire_id: Option<String>,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone)]
pub enum DiagnosticKind {
    /// The rules were rejected with these errors. Empty means valid.
    Rules(Vec<RuleError>),
    /// The document itself could not be read or parsed.
    Unreadable(String),
}

impl FileDiagnostics {
    pub fn is_clean(&self) -> bool {
        matches!(&self.kind, DiagnosticKind::Rules(errors) if errors.is_empty())
    }
}

/// Generate a SARIF 2.1.0 JSON document from validation findings.
pub fn generate_sarif(files: &[FileDiagnostics]) -> serde_json::Value {
    let rules = [
        (
            RULE_INVALID,
            "InvalidProcessingRules",
            "The questionnaire's processing_rules were rejected and will not be applied",
        ),
        (
            RULE_UNREADABLE,
            "UnreadableQuestionnaire",
            "The questionnaire document could not be read or parsed",
        ),
    ]
    .iter()
    .map(|(id, name, desc)| {
        json!({
            "id": id,
            "name": name,
            "shortDescription": { "text": desc },
        })
    })
    .collect::<Vec<_>>();

    let mut results = Vec::new();
    for file in files {
        let uri = file.path.to_string_lossy().replace('\\', "/");
        let label = file.questionnaire_id.as_deref().unwrap_or("?");

        match &file.kind {
            DiagnosticKind::Rules(errors) => {
                for error in errors {
                    results.push(json!({
                        "ruleId": RULE_INVALID,
                        "level": "error",
                        "message": { "text": format!("[{label}] {}", error.message) },
                        "locations": [{
                            "physicalLocation": { "artifactLocation": { "uri": uri } },
                            "logicalLocations": [{ "fullyQualifiedName": error.path }]
                        }]
                    }));
                }
            }
            DiagnosticKind::Unreadable(message) => {
                results.push(json!({
                    "ruleId": RULE_UNREADABLE,
                    "level": "error",
                    "message": { "text": message },
                    "locations": [{
                        "physicalLocation": { "artifactLocation": { "uri": uri } }
                    }]
                }));
            }
        }
    }

    json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "quizrules",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/quizrules/quizrules",
                    "rules": rules
                }
            },
            "results": results
        }]
    })
}

/// Write a SARIF report to a file.
pub fn write_sarif_report(files: &[FileDiagnostics], path: &Path) -> Result<()> {
    let sarif = generate_sarif(files);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&sarif)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write SARIF report to {}", path.display()))?;
    Ok(())
}
