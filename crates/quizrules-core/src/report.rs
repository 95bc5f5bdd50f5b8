//! Scoring report envelope with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::RespondentOutcome;
use crate::model::{Questionnaire, RuleSet, Severity};
use crate::statistics::{compute_aggregate_stats, AggregateStats};

/// A complete batch scoring report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the questionnaire that was scored.
    pub questionnaire: QuestionnaireSummary,
    /// Per-respondent outcomes, sorted by respondent id.
    pub results: Vec<RespondentOutcome>,
    /// Aggregate statistics.
    pub aggregate: AggregateStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of a questionnaire (without its rules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub question_count: usize,
    pub metric_count: usize,
    pub honesty_check_count: usize,
}

impl QuestionnaireSummary {
    pub fn new(questionnaire: &Questionnaire, rules: Option<&RuleSet>) -> Self {
        Self {
            id: questionnaire.id.clone(),
            title: questionnaire.title.clone(),
            question_count: questionnaire.questions.len(),
            metric_count: rules.map_or(0, |r| r.metrics.len()),
            honesty_check_count: rules.map_or(0, |r| r.honesty_checks.len()),
        }
    }
}

impl ScoringReport {
    /// Build a report over finished results, computing the aggregate.
    pub fn new(
        questionnaire: QuestionnaireSummary,
        results: Vec<RespondentOutcome>,
        duration_ms: u64,
    ) -> Self {
        let aggregate = compute_aggregate_stats(&results);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            questionnaire,
            results,
            aggregate,
            duration_ms,
        }
    }

    /// Respondents that failed at least one critical honesty check.
    pub fn critical_failures(&self) -> impl Iterator<Item = &RespondentOutcome> {
        self.results.iter().filter(|r| {
            r.outcome.honesty_checks.as_ref().is_some_and(|h| {
                h.checks
                    .iter()
                    .any(|c| !c.passed && c.severity == Severity::Critical)
            })
        })
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ScoringReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
