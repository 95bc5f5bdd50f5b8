//! The `quizrules score` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use quizrules_core::engine::{ProgressReporter, Respondent, RespondentOutcome, RulesEngine};
use quizrules_core::parser;
use quizrules_core::report::{QuestionnaireSummary, ScoringReport};
use quizrules_report::markdown::write_markdown_report;

use crate::config::load_config_from;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_respondent_complete(&self, result: &RespondentOutcome) {
        let top = result.outcome.ranking.first().map(String::as_str).unwrap_or("-");
        let honesty = match &result.outcome.honesty_checks {
            Some(h) if !h.all_passed => format!(" honesty {} failed", h.failed_count),
            _ => String::new(),
        };
        eprintln!(
            "  Done: {} top {}{} ({} diagnostics)",
            result.respondent,
            top,
            honesty,
            result.outcome.errors.len()
        );
    }

    fn on_respondent_error(&self, respondent: &str, error: &str) {
        eprintln!("  ERROR: {respondent}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} scored, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    questionnaire_path: PathBuf,
    answers_dir: PathBuf,
    parallelism: Option<usize>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let formats: Vec<&str> = if format == "all" {
        vec!["json", "markdown"]
    } else {
        format.split(',').map(str::trim).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            matches!(*fmt, "json" | "markdown"),
            "unknown format '{fmt}', expected json, markdown or all"
        );
    }

    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
        config.parallelism = p;
    }
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let questionnaire = parser::load_questionnaire(&questionnaire_path)?;
    let rules = match parser::questionnaire_rules(&questionnaire) {
        None => anyhow::bail!(
            "questionnaire '{}' has no processing_rules to score",
            questionnaire.id
        ),
        Some(Err(errors)) => {
            for e in &errors {
                eprintln!("  {e}");
            }
            anyhow::bail!(
                "processing_rules of '{}' rejected with {} error(s); run `quizrules validate` for details",
                questionnaire.id,
                errors.len()
            );
        }
        Some(Ok(rules)) => rules,
    };

    let respondents = load_respondents(&answers_dir)?;
    anyhow::ensure!(
        !respondents.is_empty(),
        "no answer files found in {}",
        answers_dir.display()
    );

    eprintln!(
        "quizrules v{}: scoring {} respondents against '{}' ({} metrics)",
        env!("CARGO_PKG_VERSION"),
        respondents.len(),
        questionnaire.id,
        rules.metrics.len()
    );
    eprintln!();

    let summary = QuestionnaireSummary::new(&questionnaire, Some(&rules));
    let engine = RulesEngine::new(config.engine_config());
    let start = Instant::now();
    let results = engine
        .score_batch(Arc::new(rules), respondents, &ConsoleReporter)
        .await?;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let report = ScoringReport::new(summary, results, duration_ms);
    print_summary(&report);

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "markdown" => {
                let path = output.join(format!("report-{timestamp}.md"));
                write_markdown_report(&report, &path)?;
                eprintln!("Markdown report: {}", path.display());
            }
            _ => {}
        }
    }

    Ok(())
}

/// Load every answer file under `dir`. The respondent id is the file's
/// path relative to `dir`, without the `.json` extension.
fn load_respondents(dir: &Path) -> Result<Vec<Respondent>> {
    let mut respondents = Vec::new();
    for path in parser::find_json_files(dir)? {
        match parser::load_answers(&path) {
            Ok(answers) => respondents.push(Respondent {
                id: respondent_id(dir, &path),
                answers,
            }),
            Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(respondents)
}

fn respondent_id(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn print_summary(report: &ScoringReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Mean", "Min", "Max", "Std dev", "Ranked first"]);

    let agg = &report.aggregate;
    for (id, stats) in &agg.per_metric {
        table.add_row(vec![
            Cell::new(id),
            Cell::new(format!("{:.2}", stats.mean)),
            Cell::new(format!("{:.2}", stats.min)),
            Cell::new(format!("{:.2}", stats.max)),
            Cell::new(format!("{:.2}", stats.std_dev)),
            Cell::new(agg.top_ranked.get(id).copied().unwrap_or(0)),
        ]);
    }

    eprintln!("\n{table}");
    if let Some(pct) = agg.mean_percentage {
        eprintln!("Mean score: {pct:.1}%");
    }
    let flagged = report.critical_failures().count();
    if flagged > 0 {
        eprintln!("Critical honesty failures: {flagged}");
    }
}
