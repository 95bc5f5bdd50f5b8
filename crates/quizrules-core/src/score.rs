//! Score override.
//!
//! Replaces the default total/max/percentage with values computed from
//! expressions. A non-positive maximum is an authoring mistake: the override
//! is withheld and the caller keeps its default scoring.

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::evaluator::{evaluate, round_to};
use crate::model::ScoreOverride;

/// Decimal places kept for `total_score` and `max_possible_score`.
const SCORE_DECIMALS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOverrideResult {
    pub total_score: f64,
    pub max_possible_score: f64,
    /// Whole-number percentage.
    pub percentage: f64,
}

/// Compute the overridden score, or `None` if it has to be withheld.
pub fn compute_score_override(
    config: &ScoreOverride,
    ctx: &mut EvaluationContext<'_>,
) -> Option<ScoreOverrideResult> {
    let total = evaluate(&config.total_expression, ctx, 0);
    let max = evaluate(&config.max_expression, ctx, 0);

    if max <= 0.0 {
        tracing::warn!(max, "score override withheld: non-positive maximum");
        ctx.push_error(format!(
            "processing_rules score max_expression must be greater than 0, got {max}"
        ));
        return None;
    }

    let mut percentage = match &config.percentage_expression {
        Some(expr) => evaluate(expr, ctx, 0),
        None => total / max * 100.0,
    };
    if !percentage.is_finite() {
        ctx.push_error("processing_rules score percentage is not a finite number");
        percentage = 0.0;
    }
    if config.clamp_percentage {
        percentage = percentage.clamp(0.0, 100.0);
    }

    Some(ScoreOverrideResult {
        total_score: round_to(total, SCORE_DECIMALS),
        max_possible_score: round_to(max, SCORE_DECIMALS),
        percentage: percentage.round(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalLimits;
    use crate::model::{AnswerMap, Expression, Metric};

    fn config(total: f64, max: f64) -> ScoreOverride {
        ScoreOverride {
            total_expression: Expression::Const(total),
            max_expression: Expression::Const(max),
            percentage_expression: None,
            clamp_percentage: true,
        }
    }

    fn run(config: &ScoreOverride) -> (Option<ScoreOverrideResult>, Vec<String>) {
        let metrics: [Metric; 0] = [];
        let answers = AnswerMap::new();
        let mut ctx = EvaluationContext::from_parts(&metrics, &answers, EvalLimits::default());
        let result = compute_score_override(config, &mut ctx);
        (result, ctx.into_errors())
    }

    #[test]
    fn derives_percentage_from_total_and_max() {
        let (result, errors) = run(&config(7.0, 9.0));
        let result = result.unwrap();
        assert!(errors.is_empty());
        assert_eq!(result.total_score, 7.0);
        assert_eq!(result.max_possible_score, 9.0);
        assert_eq!(result.percentage, 78.0);
    }

    #[test]
    fn rounds_totals_to_three_decimals() {
        let (result, _) = run(&config(1.0 / 3.0, 2.0 / 3.0));
        let result = result.unwrap();
        assert_eq!(result.total_score, 0.333);
        assert_eq!(result.max_possible_score, 0.667);
        assert_eq!(result.percentage, 50.0);
    }

    #[test]
    fn withholds_on_non_positive_max() {
        for max in [0.0, -4.0] {
            let (result, errors) = run(&config(5.0, max));
            assert!(result.is_none());
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("max_expression must be greater than 0"));
        }
    }

    #[test]
    fn clamps_percentage_unless_disabled() {
        let mut over = config(15.0, 10.0);
        assert_eq!(run(&over).0.unwrap().percentage, 100.0);

        over.clamp_percentage = false;
        assert_eq!(run(&over).0.unwrap().percentage, 150.0);

        let mut negative = config(5.0, 10.0);
        negative.percentage_expression = Some(Expression::Const(-12.4));
        assert_eq!(run(&negative).0.unwrap().percentage, 0.0);
    }

    #[test]
    fn explicit_percentage_expression_wins() {
        let mut c = config(5.0, 10.0);
        c.percentage_expression = Some(Expression::Const(66.6));
        assert_eq!(run(&c).0.unwrap().percentage, 67.0);
    }
}
