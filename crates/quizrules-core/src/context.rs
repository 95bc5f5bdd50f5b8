//! Per-run evaluation state.
//!
//! One [`EvaluationContext`] is built for every scoring run and dropped when
//! the run ends. Metrics are addressed by their index in the rule set, so the
//! memo cache and the in-progress flags are plain vectors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{AnswerMap, Metric, RuleSet};

/// Default recursion-depth limit shared by a whole run.
pub const DEFAULT_MAX_DEPTH: usize = 48;

/// Default number of expression nodes a whole run may visit.
pub const DEFAULT_MAX_NODES: usize = 3000;

/// Highest depth limit a run accepts. Anything deeper can overflow the stack.
pub const MAX_DEPTH_LIMIT: usize = 48;

/// Highest node budget a run accepts.
pub const MAX_NODES_LIMIT: usize = 100_000;

/// Resource bounds for one scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalLimits {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

impl EvalLimits {
    /// These limits with each budget capped at its ceiling.
    pub fn clamped(self) -> Self {
        Self {
            max_depth: self.max_depth.min(MAX_DEPTH_LIMIT),
            max_nodes: self.max_nodes.min(MAX_NODES_LIMIT),
        }
    }
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Mutable state owned by exactly one scoring run.
#[derive(Debug)]
pub struct EvaluationContext<'a> {
    pub(crate) answers: &'a AnswerMap,
    pub(crate) metrics: &'a [Metric],
    index: HashMap<&'a str, usize>,
    pub(crate) cache: Vec<Option<f64>>,
    pub(crate) in_progress: Vec<bool>,
    errors: Vec<String>,
    nodes_visited: usize,
    limits: EvalLimits,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(rules: &'a RuleSet, answers: &'a AnswerMap) -> Self {
        Self::with_limits(rules, answers, EvalLimits::default())
    }

    pub fn with_limits(rules: &'a RuleSet, answers: &'a AnswerMap, limits: EvalLimits) -> Self {
        Self::from_parts(&rules.metrics, answers, limits)
    }

    /// Build a context over a bare metric list.
    pub fn from_parts(metrics: &'a [Metric], answers: &'a AnswerMap, limits: EvalLimits) -> Self {
        let mut index = HashMap::with_capacity(metrics.len());
        for (i, metric) in metrics.iter().enumerate() {
            // First declaration wins; duplicates are rejected at load time anyway.
            index.entry(metric.id.as_str()).or_insert(i);
        }
        Self {
            answers,
            metrics,
            index,
            cache: vec![None; metrics.len()],
            in_progress: vec![false; metrics.len()],
            errors: Vec::new(),
            nodes_visited: 0,
            limits: limits.clamped(),
        }
    }

    pub fn limits(&self) -> EvalLimits {
        self.limits
    }

    pub fn answer(&self, question_id: &str) -> Option<f64> {
        self.answers.get(question_id).copied()
    }

    pub fn metric_index(&self, metric_id: &str) -> Option<usize> {
        self.index.get(metric_id).copied()
    }

    /// The value a metric resolved to in this run, if it has been resolved.
    pub fn cached(&self, metric_id: &str) -> Option<f64> {
        self.metric_index(metric_id).and_then(|i| self.cache[i])
    }

    /// Record a diagnostic. Identical messages are kept once.
    pub fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }

    pub fn nodes_visited(&self) -> usize {
        self.nodes_visited
    }

    /// Count one node visit against the run's budget.
    ///
    /// Returns `false` once the budget is spent.
    pub(crate) fn visit_node(&mut self) -> bool {
        self.nodes_visited += 1;
        if self.nodes_visited > self.limits.max_nodes {
            if self.nodes_visited == self.limits.max_nodes + 1 {
                tracing::warn!(
                    max_nodes = self.limits.max_nodes,
                    "processing rules node budget exhausted"
                );
            }
            self.push_error(format!(
                "processing_rules node budget of {} exceeded",
                self.limits.max_nodes
            ));
            return false;
        }
        true
    }
}
