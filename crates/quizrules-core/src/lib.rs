//! quizrules-core: Processing rules engine for questionnaire scoring.
//!
//! A questionnaire may carry declarative `processing_rules`: named metrics
//! computed from answer scores, an optional ranking, an optional score
//! override and optional honesty checks. This crate validates those rules
//! into a closed expression model and evaluates them safely against one
//! learner's answers.

pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod honesty;
pub mod model;
pub mod parser;
pub mod ranking;
pub mod report;
pub mod resolver;
pub mod score;
pub mod statistics;

pub use engine::{ProcessingOutcome, RulesEngine};
pub use error::{LoadError, RuleError};
pub use model::{AnswerMap, Expression, RuleSet};

/// Validate and apply raw `processing_rules` in one step.
///
/// Rules that fail validation are not applied; the outcome then carries the
/// validation errors and `applied` is `false`.
pub fn apply_processing_rules(raw: Option<&serde_json::Value>, answers: &AnswerMap) -> ProcessingOutcome {
    let engine = RulesEngine::default();
    match raw {
        None | Some(serde_json::Value::Null) => ProcessingOutcome::not_applied(),
        Some(raw) => match parser::normalize_rule_set(raw) {
            Ok(rules) => engine.apply(&rules, answers),
            Err(errors) => ProcessingOutcome {
                errors: errors.iter().map(ToString::to_string).collect(),
                ..ProcessingOutcome::not_applied()
            },
        },
    }
}
