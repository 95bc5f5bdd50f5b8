//! Metric resolution with cycle detection.
//!
//! Each metric is evaluated at most once per run and memoized. A metric that
//! is reached again while it is still being evaluated is part of a dependency
//! cycle: that re-entry evaluates to `0`, is reported, and is not cached.

use crate::context::EvaluationContext;
use crate::evaluator::{evaluate, round_to};

/// Resolve a metric by id. Undeclared ids resolve to `0`.
pub fn resolve_metric(metric_id: &str, ctx: &mut EvaluationContext<'_>) -> f64 {
    match ctx.metric_index(metric_id) {
        Some(index) => resolve_index(index, ctx, 0),
        None => 0.0,
    }
}

/// Resolve every declared metric, in declaration order.
pub fn resolve_all(ctx: &mut EvaluationContext<'_>) -> Vec<(String, f64)> {
    let metrics = ctx.metrics;
    metrics
        .iter()
        .enumerate()
        .map(|(index, metric)| (metric.id.clone(), resolve_index(index, ctx, 0)))
        .collect()
}

pub(crate) fn resolve_index(index: usize, ctx: &mut EvaluationContext<'_>, depth: usize) -> f64 {
    if let Some(value) = ctx.cache[index] {
        return value;
    }

    let metrics = ctx.metrics;
    let metric = &metrics[index];

    if ctx.in_progress[index] {
        tracing::warn!(metric = %metric.id, "processing rules dependency cycle");
        ctx.push_error(format!(
            "processing_rules cycle detected for metric {}",
            metric.id
        ));
        return 0.0;
    }

    ctx.in_progress[index] = true;
    let raw = evaluate(&metric.expression, ctx, depth);
    ctx.in_progress[index] = false;

    let value = match metric.precision {
        Some(precision) => round_to(raw, u32::from(precision)),
        None => raw,
    };
    ctx.cache[index] = Some(value);
    tracing::debug!(metric = %metric.id, value, "resolved metric");
    value
}
