//! Core data model types for quizrules.
//!
//! These are the typed forms of a questionnaire's `processing_rules`
//! document. They are only ever built by the normalizer in
//! [`crate::parser`], so every value here already satisfies the structural
//! invariants (arity, finite literals, `min_value <= max_value`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A learner's answers: question id to numeric score.
pub type AnswerMap = HashMap<String, f64>;

/// One node of a processing-rules expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A finite numeric literal.
    Const(f64),
    /// The score of one answered question.
    Answer {
        question_id: String,
        default: Option<f64>,
    },
    /// The value of another metric in the same rule set.
    Metric {
        metric_id: String,
        default: Option<f64>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expression>,
    },
    /// A fold over one or more arguments.
    Variadic {
        op: VariadicOp,
        args: Vec<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Div {
        numerator: Box<Expression>,
        denominator: Box<Expression>,
        on_divide_by_zero: Option<f64>,
    },
    Clamp {
        value: Box<Expression>,
        min_value: f64,
        max_value: f64,
    },
    If {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// Weighted sum over a list of answers. Missing weights count as 1.
    SumAnswers {
        question_ids: Vec<String>,
        weights: BTreeMap<String, f64>,
        default: Option<f64>,
    },
    /// Number of questions whose score equals the expected score exactly.
    CountMatches { expected_scores: BTreeMap<String, f64> },
}

impl Expression {
    /// The `op` discriminant this node is written with in JSON.
    pub fn op_name(&self) -> &'static str {
        match self {
            Expression::Const(_) => "const",
            Expression::Answer { .. } => "answer",
            Expression::Metric { .. } => "metric",
            Expression::Unary { op, .. } => op.as_str(),
            Expression::Variadic { op, .. } => op.as_str(),
            Expression::Binary { op, .. } => op.as_str(),
            Expression::Div { .. } => "div",
            Expression::Clamp { .. } => "clamp",
            Expression::If { .. } => "if",
            Expression::SumAnswers { .. } => "sum_answers",
            Expression::CountMatches { .. } => "count_matches",
        }
    }

    /// Total number of nodes in this tree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Expression::Const(_)
            | Expression::Answer { .. }
            | Expression::Metric { .. }
            | Expression::SumAnswers { .. }
            | Expression::CountMatches { .. } => 0,
            Expression::Unary { arg, .. } => arg.node_count(),
            Expression::Variadic { args, .. } => args.iter().map(Expression::node_count).sum(),
            Expression::Binary { left, right, .. } => left.node_count() + right.node_count(),
            Expression::Div {
                numerator,
                denominator,
                ..
            } => numerator.node_count() + denominator.node_count(),
            Expression::Clamp { value, .. } => value.node_count(),
            Expression::If {
                condition,
                then,
                otherwise,
            } => condition.node_count() + then.node_count() + otherwise.node_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Neg,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Abs => "abs",
            UnaryOp::Neg => "neg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariadicOp {
    Sum,
    Min,
    Max,
}

impl VariadicOp {
    pub fn as_str(self) -> &'static str {
        match self {
            VariadicOp::Sum => "sum",
            VariadicOp::Min => "min",
            VariadicOp::Max => "max",
        }
    }
}

/// Two-argument operators. Comparisons yield `1.0` or `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Sub,
    Mul,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Eq => "eq",
            BinaryOp::Neq => "neq",
            BinaryOp::Gt => "gt",
            BinaryOp::Gte => "gte",
            BinaryOp::Lt => "lt",
            BinaryOp::Lte => "lte",
        }
    }
}

/// A named, derived numeric quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Unique within the rule set.
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub expression: Expression,
    /// Decimal places to round to, `0..=6`.
    pub precision: Option<u8>,
}

/// Replaces the default "sum of all answers" score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOverride {
    pub total_expression: Expression,
    pub max_expression: Expression,
    pub percentage_expression: Option<Expression>,
    /// Clamp the percentage into `[0, 100]`. Defaults to `true`.
    pub clamp_percentage: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingConfig {
    /// Metrics to rank; `None` ranks every metric.
    pub metric_ids: Option<Vec<String>>,
    /// Keep only the first `top_n` after sorting.
    pub top_n: Option<usize>,
}

/// How serious a failed honesty check is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A pass/fail gate such as a lie scale.
#[derive(Debug, Clone, PartialEq)]
pub struct HonestyCheck {
    /// Unique within the rule set.
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub pass_expression: Expression,
    pub value_expression: Option<Expression>,
    pub severity: Severity,
}

/// A complete, validated `processing_rules` document.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    /// Always `1`.
    pub version: u32,
    pub metrics: Vec<Metric>,
    pub score: Option<ScoreOverride>,
    pub ranking: Option<RankingConfig>,
    pub honesty_checks: Vec<HonestyCheck>,
}

impl RuleSet {
    /// Whether there is anything for a scoring run to execute.
    pub fn has_content(&self) -> bool {
        !self.metrics.is_empty() || self.score.is_some() || !self.honesty_checks.is_empty()
    }
}

/// A questionnaire document as far as the engine cares about it.
///
/// `processing_rules` is kept raw: it is untrusted until normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub processing_rules: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub text: String,
}
