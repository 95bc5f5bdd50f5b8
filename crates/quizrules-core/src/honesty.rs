//! Honesty checks: pass/fail gates evaluated against the same run.

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::evaluator::{evaluate, round_to};
use crate::model::{HonestyCheck, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonestyCheckResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub passed: bool,
    pub value: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonestyReport {
    pub all_passed: bool,
    pub failed_count: usize,
    pub checks: Vec<HonestyCheckResult>,
}

/// Evaluate every check. A failing check never stops the others.
pub fn evaluate_honesty_checks(
    checks: &[HonestyCheck],
    ctx: &mut EvaluationContext<'_>,
) -> HonestyReport {
    let results: Vec<HonestyCheckResult> = checks
        .iter()
        .map(|check| {
            let pass_value = evaluate(&check.pass_expression, ctx, 0);
            let value = match &check.value_expression {
                Some(expr) => evaluate(expr, ctx, 0),
                None => pass_value,
            };
            let passed = pass_value != 0.0;
            if !passed {
                tracing::debug!(check = %check.id, severity = %check.severity, "honesty check failed");
            }
            HonestyCheckResult {
                id: check.id.clone(),
                title: check.title.clone(),
                passed,
                value: round_to(value, 3),
                severity: check.severity,
            }
        })
        .collect();

    let failed_count = results.iter().filter(|r| !r.passed).count();
    HonestyReport {
        all_passed: failed_count == 0,
        failed_count,
        checks: results,
    }
}
