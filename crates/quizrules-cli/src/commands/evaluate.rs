//! The `quizrules evaluate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use quizrules_core::engine::{ProcessingOutcome, RulesEngine};
use quizrules_core::model::{AnswerMap, Questionnaire, RuleSet};
use quizrules_core::parser;

use crate::config::load_config_from;

/// Highest score a single answer can carry under default scoring.
const DEFAULT_MAX_PER_QUESTION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Override,
    Default,
}

/// The score shown to the learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub total_score: f64,
    pub max_possible_score: f64,
    pub percentage: f64,
    pub source: ScoreSource,
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    questionnaire: &'a str,
    score: &'a ScoreSummary,
    #[serde(flatten)]
    outcome: &'a ProcessingOutcome,
}

pub fn execute(
    questionnaire_path: PathBuf,
    answers_path: PathBuf,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}', expected text or json"
    );

    let config = load_config_from(config_path.as_deref())?;
    let questionnaire = parser::load_questionnaire(&questionnaire_path)?;
    let answers = parser::load_answers(&answers_path)?;

    let engine = RulesEngine::new(config.engine_config());
    let (rules, outcome) = run(&engine, &questionnaire, &answers);
    let score = summarize_score(&outcome, &questionnaire, &answers);

    if format == "json" {
        let output = EvaluateOutput {
            questionnaire: &questionnaire.id,
            score: &score,
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&questionnaire, rules.as_ref(), &outcome, &score);
    }

    Ok(())
}

fn run(
    engine: &RulesEngine,
    questionnaire: &Questionnaire,
    answers: &AnswerMap,
) -> (Option<RuleSet>, ProcessingOutcome) {
    match parser::questionnaire_rules(questionnaire) {
        None => (None, ProcessingOutcome::not_applied()),
        Some(Ok(rules)) => {
            let outcome = engine.apply(&rules, answers);
            (Some(rules), outcome)
        }
        Some(Err(errors)) => {
            tracing::warn!(
                questionnaire = %questionnaire.id,
                errors = errors.len(),
                "processing_rules rejected, falling back to default scoring"
            );
            let outcome = ProcessingOutcome {
                errors: errors.iter().map(ToString::to_string).collect(),
                ..ProcessingOutcome::not_applied()
            };
            (None, outcome)
        }
    }
}

/// Use the override when the rules produced one, else default scoring.
pub fn summarize_score(
    outcome: &ProcessingOutcome,
    questionnaire: &Questionnaire,
    answers: &AnswerMap,
) -> ScoreSummary {
    match &outcome.score_override {
        Some(s) => ScoreSummary {
            total_score: s.total_score,
            max_possible_score: s.max_possible_score,
            percentage: s.percentage,
            source: ScoreSource::Override,
        },
        None => default_score(questionnaire, answers),
    }
}

/// Sum of answer scores against `10 x question count`.
pub fn default_score(questionnaire: &Questionnaire, answers: &AnswerMap) -> ScoreSummary {
    let question_count = if questionnaire.questions.is_empty() {
        answers.len()
    } else {
        questionnaire.questions.len()
    };
    let total: f64 = if questionnaire.questions.is_empty() {
        answers.values().sum()
    } else {
        questionnaire
            .questions
            .iter()
            .filter_map(|q| answers.get(&q.id))
            .sum()
    };
    let max = DEFAULT_MAX_PER_QUESTION * question_count as f64;
    let percentage = if max > 0.0 {
        (total / max * 100.0).round()
    } else {
        0.0
    };
    ScoreSummary {
        total_score: total,
        max_possible_score: max,
        percentage,
        source: ScoreSource::Default,
    }
}

fn print_text(
    questionnaire: &Questionnaire,
    rules: Option<&RuleSet>,
    outcome: &ProcessingOutcome,
    score: &ScoreSummary,
) {
    let title = if questionnaire.title.is_empty() {
        questionnaire.id.as_str()
    } else {
        questionnaire.title.as_str()
    };
    println!("Questionnaire: {title}");

    if !outcome.applied {
        println!("Processing rules: not applied");
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Metric", "Title", "Value", "Rank"]);
        let declared = rules.map(|r| r.metrics.as_slice()).unwrap_or_default();
        for metric in declared {
            let value = outcome.metrics.get(&metric.id).copied().unwrap_or(0.0);
            let rank = outcome
                .ranking
                .iter()
                .position(|id| id == &metric.id)
                .map(|p| (p + 1).to_string())
                .unwrap_or_else(|| "-".into());
            table.add_row(vec![
                Cell::new(&metric.id),
                Cell::new(metric.title.as_deref().unwrap_or("")),
                Cell::new(value),
                Cell::new(rank),
            ]);
        }
        println!("\n{table}");

        if !outcome.ranking.is_empty() {
            println!("\nRanking: {}", outcome.ranking.join(" > "));
        }
    }

    let source = match score.source {
        ScoreSource::Override => "override",
        ScoreSource::Default => "default",
    };
    println!(
        "\nScore: {} / {} ({}%) [{source}]",
        score.total_score, score.max_possible_score, score.percentage
    );

    if let Some(honesty) = &outcome.honesty_checks {
        println!(
            "\nHonesty checks: {}",
            if honesty.all_passed {
                "all passed".to_string()
            } else {
                format!("{} failed", honesty.failed_count)
            }
        );
        for check in &honesty.checks {
            println!(
                "  [{}] {} ({}): value {}",
                if check.passed { "PASS" } else { "FAIL" },
                check.id,
                check.severity,
                check.value
            );
        }
    }

    if !outcome.errors.is_empty() {
        println!("\nDiagnostics:");
        for e in &outcome.errors {
            println!("  {e}");
        }
    }
}
