//! End-to-end pipeline tests: raw `processing_rules` JSON through
//! normalization, evaluation and batch scoring.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use quizrules_core::apply_processing_rules;
use quizrules_core::context::EvalLimits;
use quizrules_core::engine::{EngineConfig, NoopReporter, Respondent, RulesEngine};
use quizrules_core::model::Severity;
use quizrules_core::parser::{self, normalize, normalize_rule_set, validate};
use quizrules_core::report::{QuestionnaireSummary, ScoringReport};
use quizrules_core::AnswerMap;

fn answers(raw: Value) -> AnswerMap {
    parser::answers_from_value(&raw)
}

fn single_metric(expression: Value) -> Value {
    json!({
        "version": 1,
        "metrics": [{ "id": "m", "expression": expression }]
    })
}

fn fixtures() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../.."))
}

// --- Properties ---

#[test]
fn evaluation_is_deterministic() {
    let questionnaire =
        parser::load_questionnaire(&fixtures().join("questionnaires/big-five.json")).unwrap();
    let answers = parser::load_answers(&fixtures().join("answers/big-five/bob.json")).unwrap();
    let raw = questionnaire.processing_rules.as_ref();

    let first = apply_processing_rules(raw, &answers);
    for _ in 0..10 {
        assert_eq!(apply_processing_rules(raw, &answers), first);
    }
    assert!(first.applied);
}

#[test]
fn unsupported_op_is_rejected() {
    let raw = single_metric(json!({ "op": "eval", "code": "process.exit()" }));

    assert!(normalize(&raw).is_none());
    let report = validate(&raw);
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("unsupported op 'eval'")));

    let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());
    assert!(!outcome.applied);
    assert!(outcome.metrics.is_empty());
    assert!(!outcome.errors.is_empty());
}

#[test]
fn every_error_is_reported() {
    let raw = json!({
        "version": 1,
        "metrics": [
            { "id": "a", "expression": { "op": "pow" } },
            { "id": "a", "expression": { "op": "const", "value": "x" } }
        ],
        "ranking": { "metric_ids": ["ghost"], "top_n": 0 }
    });
    let errors = normalize_rule_set(&raw).unwrap_err();
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    assert!(messages.len() >= 4, "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("metrics[0].expression")));
    assert!(messages.iter().any(|m| m.contains("metrics[1].expression.value")));
}

#[test]
fn mutual_cycle_terminates() {
    let raw = json!({
        "version": 1,
        "metrics": [
            { "id": "a", "expression": { "op": "sum", "args": [
                { "op": "metric", "metric_id": "b" }, { "op": "const", "value": 1 }
            ] } },
            { "id": "b", "expression": { "op": "sum", "args": [
                { "op": "metric", "metric_id": "a" }, { "op": "const", "value": 1 }
            ] } }
        ]
    });

    let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());
    assert!(outcome.applied);
    assert!(outcome.metrics["a"].is_finite());
    assert!(outcome.metrics["b"].is_finite());
    assert!(outcome.errors.iter().any(|e| {
        e == "processing_rules cycle detected for metric a"
            || e == "processing_rules cycle detected for metric b"
    }));
}

#[test]
fn weighted_sum_answers() {
    let raw = single_metric(json!({
        "op": "sum_answers",
        "question_ids": ["q1", "q2"],
        "weights": { "q1": 2, "q2": 1 }
    }));
    let outcome = apply_processing_rules(
        Some(&raw),
        &answers(json!({ "q1": { "score": 1 }, "q2": { "score": 1 } })),
    );
    assert_eq!(outcome.metrics["m"], 3.0);
}

#[test]
fn count_matches() {
    let raw = single_metric(json!({
        "op": "count_matches",
        "expected_scores": { "q1": 1, "q2": 0, "q3": 1 }
    }));
    let outcome = apply_processing_rules(
        Some(&raw),
        &answers(json!({ "q1": { "score": 1 }, "q2": { "score": 0 }, "q3": { "score": 0 } })),
    );
    assert_eq!(outcome.metrics["m"], 2.0);
}

#[test]
fn score_override_divide_guard() {
    for max in [0.0, -10.0] {
        let raw = json!({
            "version": 1,
            "metrics": [{ "id": "m", "expression": { "op": "const", "value": 5 } }],
            "score": {
                "total_expression": { "op": "metric", "metric_id": "m" },
                "max_expression": { "op": "const", "value": max }
            }
        });
        let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());
        assert!(outcome.score_override.is_none());
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("max_expression must be greater than 0")));

        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("score_override").is_none());
    }
}

#[test]
fn ranking_top_n() {
    let raw = json!({
        "version": 1,
        "metrics": [
            { "id": "high", "expression": { "op": "const", "value": 10 } },
            { "id": "low", "expression": { "op": "const", "value": 5 } },
            { "id": "mid", "expression": { "op": "const", "value": 8 } }
        ],
        "ranking": { "top_n": 2 }
    });
    let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());
    assert_eq!(outcome.ranking, ["high", "mid"]);
}

#[test]
fn honesty_severity_passthrough() {
    let raw = json!({
        "version": 1,
        "honesty_checks": [{
            "id": "lie",
            "severity": "critical",
            "pass_expression": { "op": "gt", "args": [
                { "op": "const", "value": 1 }, { "op": "const", "value": 2 }
            ] }
        }]
    });
    let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());
    let honesty = outcome.honesty_checks.unwrap();
    assert_eq!(honesty.failed_count, 1);
    assert!(!honesty.all_passed);
    assert!(!honesty.checks[0].passed);
    assert_eq!(honesty.checks[0].severity, Severity::Critical);

    let json = serde_json::to_value(&honesty.checks[0]).unwrap();
    assert_eq!(json["severity"], "critical");
}

// --- Resource bounds ---

#[test]
fn node_budget_is_fail_open() {
    let args: Vec<Value> = (0..50).map(|_| json!({ "op": "const", "value": 1 })).collect();
    let raw = json!({
        "version": 1,
        "metrics": [
            { "id": "wide", "expression": { "op": "sum", "args": args } },
            { "id": "after", "expression": { "op": "const", "value": 7 } }
        ]
    });
    let rules = normalize_rule_set(&raw).unwrap();
    let engine = RulesEngine::new(EngineConfig {
        parallelism: 1,
        limits: EvalLimits {
            max_depth: 48,
            max_nodes: 20,
        },
    });

    let outcome = engine.apply(&rules, &AnswerMap::new());
    assert!(outcome.applied);
    assert_eq!(outcome.metrics["wide"], 19.0);
    assert_eq!(outcome.metrics["after"], 0.0);
    assert_eq!(
        outcome.errors,
        ["processing_rules node budget of 20 exceeded"]
    );
}

/// Metrics `m0..m{len-1}` where each one reads the next and the last is `1`.
fn metric_chain(len: usize) -> Value {
    let metrics: Vec<Value> = (0..len)
        .map(|i| {
            let expression = if i + 1 == len {
                json!({ "op": "const", "value": 1 })
            } else {
                json!({ "op": "metric", "metric_id": format!("m{}", i + 1) })
            };
            json!({ "id": format!("m{i}"), "expression": expression })
        })
        .collect();
    json!({ "version": 1, "metrics": metrics })
}

#[test]
fn depth_limit_spans_metric_chain() {
    let raw = metric_chain(60);
    let outcome = apply_processing_rules(Some(&raw), &AnswerMap::new());

    assert!(outcome.applied);
    assert_eq!(outcome.metrics.len(), 60);
    assert!(outcome.metrics.values().all(|v| v.is_finite()));
    assert_eq!(
        outcome.errors,
        ["processing_rules maximum evaluation depth of 48 exceeded"]
    );
    // m49 is the first metric past the limit; everything reading it sees 0.
    assert_eq!(outcome.metrics["m0"], 0.0);
    assert_eq!(outcome.metrics["m48"], 0.0);
    assert_eq!(outcome.metrics["m50"], 1.0);
    assert_eq!(outcome.metrics["m59"], 1.0);
}

#[test]
fn oversized_limits_still_bound_long_chain() {
    let rules = normalize_rule_set(&metric_chain(50_000)).unwrap();
    let engine = RulesEngine::new(EngineConfig {
        parallelism: 1,
        limits: EvalLimits {
            max_depth: usize::MAX,
            max_nodes: usize::MAX,
        },
    });
    assert_eq!(engine.config().limits.max_depth, usize::MAX);

    let outcome = engine.apply(&rules, &AnswerMap::new());
    assert!(outcome.applied);
    assert_eq!(outcome.metrics.len(), 50_000);
    assert!(outcome.metrics.values().all(|v| v.is_finite()));
    assert!(outcome
        .errors
        .iter()
        .any(|e| e == "processing_rules maximum evaluation depth of 48 exceeded"));
}

#[test]
fn missing_rules_do_not_apply() {
    let outcome = apply_processing_rules(None, &AnswerMap::new());
    assert!(!outcome.applied);
    assert!(outcome.errors.is_empty());

    let outcome = apply_processing_rules(Some(&Value::Null), &AnswerMap::new());
    assert!(!outcome.applied);
}

// --- Batch pipeline ---

#[tokio::test]
async fn batch_scoring_over_fixtures() {
    let questionnaire =
        parser::load_questionnaire(&fixtures().join("questionnaires/big-five.json")).unwrap();
    let rules = parser::questionnaire_rules(&questionnaire).unwrap().unwrap();

    let respondents: Vec<Respondent> = ["carol", "alice", "bob"]
        .iter()
        .map(|name| Respondent {
            id: name.to_string(),
            answers: parser::load_answers(
                &fixtures().join(format!("answers/big-five/{name}.json")),
            )
            .unwrap(),
        })
        .collect();

    let summary = QuestionnaireSummary::new(&questionnaire, Some(&rules));
    let engine = RulesEngine::new(EngineConfig {
        parallelism: 3,
        limits: EvalLimits::default(),
    });
    let results = engine
        .score_batch(Arc::new(rules), respondents, &NoopReporter)
        .await
        .unwrap();

    let order: Vec<&str> = results.iter().map(|r| r.respondent.as_str()).collect();
    assert_eq!(order, ["alice", "bob", "carol"]);

    let alice = &results[0].outcome;
    assert_eq!(alice.metrics["profile_strength"], 17.0);
    assert_eq!(alice.ranking, ["openness", "extraversion"]);
    assert_eq!(alice.score_override.as_ref().unwrap().percentage, 73.0);

    let carol = &results[2].outcome;
    assert_eq!(carol.ranking, ["extraversion", "openness"]);

    let report = ScoringReport::new(summary, results, 0);
    assert_eq!(report.questionnaire.metric_count, 4);
    assert_eq!(report.aggregate.respondents, 3);
    assert_eq!(report.aggregate.per_check["consistency"].failed, 1);
    let flagged: Vec<&str> = report
        .critical_failures()
        .map(|r| r.respondent.as_str())
        .collect();
    assert_eq!(flagged, ["bob"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.save_json(&path).unwrap();
    let loaded = ScoringReport::load_json(&path).unwrap();
    assert_eq!(loaded.results, report.results);
    assert_eq!(loaded.aggregate, report.aggregate);
}
