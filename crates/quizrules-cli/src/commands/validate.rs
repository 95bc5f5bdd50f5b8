//! The `quizrules validate` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use quizrules_core::parser::{self, find_json_files};
use quizrules_report::sarif::{generate_sarif, DiagnosticKind, FileDiagnostics};

pub fn execute(questionnaire_path: PathBuf, format: String) -> Result<()> {
    let files = if questionnaire_path.is_dir() {
        find_json_files(&questionnaire_path)?
    } else {
        vec![questionnaire_path]
    };

    let findings: Vec<FileDiagnostics> = files.iter().map(|path| check_file(path)).collect();

    match format.as_str() {
        "text" => print_text(&findings),
        "sarif" => println!("{}", serde_json::to_string_pretty(&generate_sarif(&findings))?),
        other => anyhow::bail!("unknown format '{other}', expected text or sarif"),
    }

    let invalid = findings.iter().filter(|f| !f.is_clean()).count();
    if invalid > 0 {
        anyhow::bail!("{invalid} questionnaire(s) have invalid processing_rules");
    }
    Ok(())
}

fn check_file(path: &Path) -> FileDiagnostics {
    match parser::load_questionnaire(path) {
        Ok(questionnaire) => {
            let errors = match parser::questionnaire_rules(&questionnaire) {
                None | Some(Ok(_)) => Vec::new(),
                Some(Err(errors)) => errors,
            };
            FileDiagnostics {
                path: path.to_path_buf(),
                questionnaire_id: Some(questionnaire.id),
                kind: DiagnosticKind::Rules(errors),
            }
        }
        Err(e) => FileDiagnostics {
            path: path.to_path_buf(),
            questionnaire_id: None,
            kind: DiagnosticKind::Unreadable(e.to_string()),
        },
    }
}

fn print_text(findings: &[FileDiagnostics]) {
    for f in findings {
        let id = f.questionnaire_id.as_deref().unwrap_or("?");
        match &f.kind {
            DiagnosticKind::Rules(errors) if errors.is_empty() => {
                println!("{}: questionnaire '{id}' OK", f.path.display());
            }
            DiagnosticKind::Rules(errors) => {
                println!(
                    "{}: questionnaire '{id}' INVALID ({} error(s))",
                    f.path.display(),
                    errors.len()
                );
                for e in errors {
                    println!("  {e}");
                }
            }
            DiagnosticKind::Unreadable(message) => {
                println!("{}: ERROR: {message}", f.path.display());
            }
        }
    }

    let valid = findings.iter().filter(|f| f.is_clean()).count();
    if valid == findings.len() {
        println!("All {valid} questionnaire(s) valid.");
    }
}
