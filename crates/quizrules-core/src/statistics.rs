//! Aggregate statistics across a batch of scored respondents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::RespondentOutcome;
use crate::evaluator::round_to;
use crate::model::Severity;

/// Aggregate statistics across all respondents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Number of respondents scored.
    pub respondents: usize,
    /// Respondents whose rules were applied.
    pub applied: usize,
    /// Respondents with at least one diagnostic.
    pub respondents_with_errors: usize,
    /// Per-metric distribution.
    pub per_metric: BTreeMap<String, MetricStats>,
    /// Per-honesty-check failure counts.
    pub per_check: BTreeMap<String, CheckStats>,
    /// Mean override percentage, when any respondent produced one.
    pub mean_percentage: Option<f64>,
    /// How often each metric came out on top of the ranking.
    pub top_ranked: BTreeMap<String, usize>,
}

/// Distribution of one metric across respondents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Outcome of one honesty check across respondents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckStats {
    pub severity: Severity,
    pub evaluated: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

/// Compute aggregate statistics from all outcomes.
pub fn compute_aggregate_stats(results: &[RespondentOutcome]) -> AggregateStats {
    let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut checks: BTreeMap<&str, (Severity, usize, usize)> = BTreeMap::new();
    let mut top_ranked: BTreeMap<String, usize> = BTreeMap::new();
    let mut percentages = Vec::new();

    for r in results {
        let outcome = &r.outcome;
        for (id, value) in &outcome.metrics {
            values.entry(id.as_str()).or_default().push(*value);
        }
        if let Some(first) = outcome.ranking.first() {
            *top_ranked.entry(first.clone()).or_default() += 1;
        }
        if let Some(score) = &outcome.score_override {
            percentages.push(score.percentage);
        }
        if let Some(report) = &outcome.honesty_checks {
            for check in &report.checks {
                let entry = checks
                    .entry(check.id.as_str())
                    .or_insert((check.severity, 0, 0));
                entry.1 += 1;
                if !check.passed {
                    entry.2 += 1;
                }
            }
        }
    }

    let per_metric = values
        .into_iter()
        .map(|(id, v)| (id.to_string(), metric_stats(&v)))
        .collect();

    let per_check = checks
        .into_iter()
        .map(|(id, (severity, evaluated, failed))| {
            let pass_rate = if evaluated == 0 {
                0.0
            } else {
                (evaluated - failed) as f64 / evaluated as f64
            };
            (
                id.to_string(),
                CheckStats {
                    severity,
                    evaluated,
                    failed,
                    pass_rate: round_to(pass_rate, 4),
                },
            )
        })
        .collect();

    let mean_percentage = if percentages.is_empty() {
        None
    } else {
        Some(round_to(
            percentages.iter().sum::<f64>() / percentages.len() as f64,
            2,
        ))
    };

    AggregateStats {
        respondents: results.len(),
        applied: results.iter().filter(|r| r.outcome.applied).count(),
        respondents_with_errors: results
            .iter()
            .filter(|r| !r.outcome.errors.is_empty())
            .count(),
        per_metric,
        per_check,
        mean_percentage,
        top_ranked,
    }
}

fn metric_stats(values: &[f64]) -> MetricStats {
    let n = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    MetricStats {
        count: values.len(),
        mean: round_to(mean, 4),
        min: if values.is_empty() { 0.0 } else { min },
        max: if values.is_empty() { 0.0 } else { max },
        std_dev: round_to(variance.sqrt(), 4),
    }
}
