//! Tree-walking expression evaluator.
//!
//! [`evaluate`] always returns a finite number. Semantic problems (dangling
//! metric references, cycles, exhausted budgets, non-finite arithmetic)
//! evaluate the offending subtree to `0` and record a diagnostic on the
//! context, so the rest of the run still completes.

use crate::context::EvaluationContext;
use crate::model::{BinaryOp, Expression, UnaryOp, VariadicOp};
use crate::resolver;

/// Evaluate `expr` at the given recursion `depth`.
///
/// Depth and node budgets are shared by the whole run, including metrics
/// resolved on the way.
pub fn evaluate(expr: &Expression, ctx: &mut EvaluationContext<'_>, depth: usize) -> f64 {
    let max_depth = ctx.limits().max_depth;
    if depth > max_depth {
        ctx.push_error(format!(
            "processing_rules maximum evaluation depth of {max_depth} exceeded"
        ));
        return 0.0;
    }
    if !ctx.visit_node() {
        return 0.0;
    }

    let value = match expr {
        Expression::Const(value) => *value,
        Expression::Answer {
            question_id,
            default,
        } => ctx
            .answer(question_id)
            .unwrap_or_else(|| default.unwrap_or(0.0)),
        Expression::Metric { metric_id, default } => match ctx.metric_index(metric_id) {
            Some(index) => resolver::resolve_index(index, ctx, depth + 1),
            None => {
                if default.is_none() {
                    ctx.push_error(format!(
                        "processing_rules metric reference '{metric_id}' is not declared"
                    ));
                }
                default.unwrap_or(0.0)
            }
        },
        Expression::Unary { op, arg } => {
            let v = evaluate(arg, ctx, depth + 1);
            match op {
                UnaryOp::Abs => v.abs(),
                UnaryOp::Neg => -v,
            }
        }
        Expression::Variadic { op, args } => {
            let values = args.iter().map(|arg| evaluate(arg, ctx, depth + 1));
            match op {
                VariadicOp::Sum => values.sum(),
                VariadicOp::Min => values.reduce(f64::min).unwrap_or(0.0),
                VariadicOp::Max => values.reduce(f64::max).unwrap_or(0.0),
            }
        }
        Expression::Binary { op, left, right } => {
            let l = evaluate(left, ctx, depth + 1);
            let r = evaluate(right, ctx, depth + 1);
            eval_binary_op(*op, l, r)
        }
        Expression::Div {
            numerator,
            denominator,
            on_divide_by_zero,
        } => {
            let n = evaluate(numerator, ctx, depth + 1);
            let d = evaluate(denominator, ctx, depth + 1);
            if d.abs() < f64::EPSILON {
                on_divide_by_zero.unwrap_or(0.0)
            } else {
                n / d
            }
        }
        Expression::Clamp {
            value,
            min_value,
            max_value,
        } => {
            // Not f64::clamp: it panics on an inverted range.
            evaluate(value, ctx, depth + 1)
                .max(*min_value)
                .min(*max_value)
        }
        Expression::If {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, ctx, depth + 1) != 0.0 {
                evaluate(then, ctx, depth + 1)
            } else {
                evaluate(otherwise, ctx, depth + 1)
            }
        }
        Expression::SumAnswers {
            question_ids,
            weights,
            default,
        } => question_ids
            .iter()
            .map(|id| {
                let weight = weights.get(id).copied().unwrap_or(1.0);
                let score = ctx.answer(id).unwrap_or_else(|| default.unwrap_or(0.0));
                weight * score
            })
            .sum(),
        Expression::CountMatches { expected_scores } => expected_scores
            .iter()
            .filter(|(id, expected)| ctx.answer(id) == Some(**expected))
            .count() as f64,
    };

    if value.is_finite() {
        value
    } else {
        ctx.push_error(format!(
            "processing_rules '{}' produced a non-finite value",
            expr.op_name()
        ));
        0.0
    }
}

/// Apply a two-argument operator. Comparisons yield `1.0` or `0.0`.
pub fn eval_binary_op(op: BinaryOp, left: f64, right: f64) -> f64 {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Eq => truth(left == right),
        BinaryOp::Neq => truth(left != right),
        BinaryOp::Gt => truth(left > right),
        BinaryOp::Gte => truth(left >= right),
        BinaryOp::Lt => truth(left < right),
        BinaryOp::Lte => truth(left <= right),
    }
}

/// Round to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = (value * factor).round();
    if scaled.is_finite() {
        scaled / factor
    } else {
        value
    }
}
