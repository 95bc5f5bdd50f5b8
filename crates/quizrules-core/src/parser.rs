//! Processing-rules normalizer and validator.
//!
//! Turns untrusted `processing_rules` JSON into a typed [`RuleSet`], or
//! reports every authoring error it finds. Also loads questionnaire
//! documents and answer files from disk.
//!
//! Normalization is fail-closed: a rule set with any error is rejected as a
//! whole, never partially applied.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LoadError, RuleError};
use crate::model::{
    AnswerMap, BinaryOp, Expression, HonestyCheck, Metric, Questionnaire, RankingConfig, RuleSet,
    ScoreOverride, Severity, UnaryOp, VariadicOp,
};

/// Deepest expression nesting accepted at load time.
pub const MAX_EXPRESSION_DEPTH: usize = 48;

/// Highest `precision` a metric may request.
pub const MAX_PRECISION: u64 = 6;

const SUPPORTED_VERSION: u64 = 1;
const ROOT: &str = "processing_rules";

/// Outcome of authoring-time validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Normalize raw `processing_rules` into a typed rule set.
///
/// Returns every error found, not just the first.
pub fn normalize_rule_set(raw: &Value) -> Result<RuleSet, Vec<RuleError>> {
    let mut normalizer = Normalizer::default();
    let rules = normalizer.rule_set(raw);
    match rules {
        Some(rules) if normalizer.errors.is_empty() => Ok(rules),
        _ => {
            if normalizer.errors.is_empty() {
                normalizer.error(ROOT, "processing_rules could not be normalized");
            }
            Err(normalizer.errors)
        }
    }
}

/// Normalize raw `processing_rules`, discarding the errors.
pub fn normalize(raw: &Value) -> Option<RuleSet> {
    normalize_rule_set(raw).ok()
}

/// Validate raw `processing_rules` for an editor or CI check.
pub fn validate(raw: &Value) -> ValidationReport {
    match normalize_rule_set(raw) {
        Ok(_) => ValidationReport {
            valid: true,
            errors: Vec::new(),
        },
        Err(errors) => ValidationReport {
            valid: false,
            errors: errors.iter().map(ToString::to_string).collect(),
        },
    }
}

/// Normalize a single expression rooted at `path`.
pub fn normalize_expression(raw: &Value, path: &str) -> Result<Expression, Vec<RuleError>> {
    let mut normalizer = Normalizer::default();
    match normalizer.expression(raw, path, 1) {
        Some(expr) if normalizer.errors.is_empty() => Ok(expr),
        _ => Err(normalizer.errors),
    }
}

/// Normalize the rules embedded in a questionnaire.
///
/// `None` means the questionnaire carries no `processing_rules`, so the
/// engine does not apply. That is not an error.
pub fn questionnaire_rules(questionnaire: &Questionnaire) -> Option<Result<RuleSet, Vec<RuleError>>> {
    match &questionnaire.processing_rules {
        None | Some(Value::Null) => None,
        Some(raw) => Some(normalize_rule_set(raw)),
    }
}

#[derive(Default)]
struct Normalizer {
    errors: Vec<RuleError>,
}

impl Normalizer {
    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(RuleError::new(path, message));
    }

    fn rule_set(&mut self, raw: &Value) -> Option<RuleSet> {
        let Some(obj) = raw.as_object() else {
            self.error(ROOT, "processing_rules must be an object");
            return None;
        };

        let version = match obj.get("version") {
            Some(v) if v.as_f64() == Some(SUPPORTED_VERSION as f64) => SUPPORTED_VERSION as u32,
            Some(other) => {
                self.error(
                    &format!("{ROOT}.version"),
                    format!("unsupported version {other}, expected {SUPPORTED_VERSION}"),
                );
                SUPPORTED_VERSION as u32
            }
            None => {
                self.error(
                    &format!("{ROOT}.version"),
                    format!("version is required and must be {SUPPORTED_VERSION}"),
                );
                SUPPORTED_VERSION as u32
            }
        };

        let metrics = self.list(obj, ROOT, "metrics", Self::metric);
        let score = match obj.get("score") {
            None | Some(Value::Null) => None,
            Some(raw) => self.score_override(raw, &format!("{ROOT}.score")),
        };
        let ranking = match obj.get("ranking") {
            None | Some(Value::Null) => None,
            Some(raw) => self.ranking(raw, &format!("{ROOT}.ranking")),
        };
        let honesty_checks = self.list(obj, ROOT, "honesty_checks", Self::honesty_check);

        let rules = RuleSet {
            version,
            metrics,
            score,
            ranking,
            honesty_checks,
        };

        // Cross-reference checks only look at what parsed structurally.
        self.cross_reference(&rules);

        // Judged on the raw input so a broken metric is not also reported as "empty".
        let declared = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        };
        if !declared("metrics") && !declared("score") && !declared("honesty_checks") {
            self.error(
                ROOT,
                "processing_rules must define at least one of metrics, score or honesty_checks",
            );
        }

        Some(rules)
    }

    /// Parse an optional array field, one item at a time.
    fn list<T>(
        &mut self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
        item: fn(&mut Self, &Value, &str) -> Option<T>,
    ) -> Vec<T> {
        match obj.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, raw)| item(self, raw, &format!("{parent}.{key}[{i}]")))
                .collect(),
            Some(_) => {
                self.error(&format!("{parent}.{key}"), format!("{key} must be an array"));
                Vec::new()
            }
        }
    }

    fn metric(&mut self, raw: &Value, path: &str) -> Option<Metric> {
        let Some(obj) = raw.as_object() else {
            self.error(path, "metric must be an object");
            return None;
        };
        let id = self.required_id(obj, path, "id");
        let title = self.optional_string(obj, path, "title");
        let description = self.optional_string(obj, path, "description");
        let expression = self.required_expression(obj, path, "expression");
        let precision = match obj.get("precision") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(p) if p <= MAX_PRECISION => Some(p as u8),
                _ => {
                    self.error(
                        &format!("{path}.precision"),
                        format!("precision must be an integer between 0 and {MAX_PRECISION}"),
                    );
                    None
                }
            },
        };

        Some(Metric {
            id: id?,
            title,
            description,
            expression: expression?,
            precision,
        })
    }

    fn score_override(&mut self, raw: &Value, path: &str) -> Option<ScoreOverride> {
        let Some(obj) = raw.as_object() else {
            self.error(path, "score must be an object");
            return None;
        };
        let total_expression = self.required_expression(obj, path, "total_expression");
        let max_expression = self.required_expression(obj, path, "max_expression");
        let percentage_expression = self.optional_expression(obj, path, "percentage_expression");
        let clamp_percentage = match obj.get("clamp_percentage") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.error(
                    &format!("{path}.clamp_percentage"),
                    "clamp_percentage must be a boolean",
                );
                true
            }
        };

        Some(ScoreOverride {
            total_expression: total_expression?,
            max_expression: max_expression?,
            percentage_expression,
            clamp_percentage,
        })
    }

    fn ranking(&mut self, raw: &Value, path: &str) -> Option<RankingConfig> {
        let Some(obj) = raw.as_object() else {
            self.error(path, "ranking must be an object");
            return None;
        };
        let metric_ids = match obj.get("metric_ids") {
            None | Some(Value::Null) => None,
            Some(v) => self.string_list(v, &format!("{path}.metric_ids"), false),
        };
        let top_n = match obj.get("top_n") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_f64() {
                Some(n) if n.fract() == 0.0 && n.is_finite() => {
                    if n <= 0.0 {
                        self.error(&format!("{path}.top_n"), "top_n must be a positive integer");
                        None
                    } else {
                        Some(n as usize)
                    }
                }
                _ => {
                    self.error(&format!("{path}.top_n"), "top_n must be a positive integer");
                    None
                }
            },
        };
        Some(RankingConfig { metric_ids, top_n })
    }

    fn honesty_check(&mut self, raw: &Value, path: &str) -> Option<HonestyCheck> {
        let Some(obj) = raw.as_object() else {
            self.error(path, "honesty check must be an object");
            return None;
        };
        let id = self.required_id(obj, path, "id");
        let title = self.optional_string(obj, path, "title");
        let description = self.optional_string(obj, path, "description");
        let pass_expression = self.required_expression(obj, path, "pass_expression");
        let value_expression = self.optional_expression(obj, path, "value_expression");
        let severity = match obj.get("severity") {
            None | Some(Value::Null) => Severity::default(),
            Some(Value::String(s)) => match s.parse::<Severity>() {
                Ok(severity) => severity,
                Err(_) => {
                    self.error(
                        &format!("{path}.severity"),
                        format!("severity must be one of info, warning, critical; got '{s}'"),
                    );
                    Severity::default()
                }
            },
            Some(_) => {
                self.error(&format!("{path}.severity"), "severity must be a string");
                Severity::default()
            }
        };

        Some(HonestyCheck {
            id: id?,
            title,
            description,
            pass_expression: pass_expression?,
            value_expression,
            severity,
        })
    }

    fn cross_reference(&mut self, rules: &RuleSet) {
        let mut metric_ids = HashSet::new();
        for (i, metric) in rules.metrics.iter().enumerate() {
            if !metric_ids.insert(metric.id.as_str()) {
                self.error(
                    &format!("{ROOT}.metrics[{i}].id"),
                    format!("duplicate metric id '{}'", metric.id),
                );
            }
        }

        let mut check_ids = HashSet::new();
        for (i, check) in rules.honesty_checks.iter().enumerate() {
            if !check_ids.insert(check.id.as_str()) {
                self.error(
                    &format!("{ROOT}.honesty_checks[{i}].id"),
                    format!("duplicate honesty check id '{}'", check.id),
                );
            }
        }

        if let Some(ids) = rules.ranking.as_ref().and_then(|r| r.metric_ids.as_ref()) {
            for (i, id) in ids.iter().enumerate() {
                if !metric_ids.contains(id.as_str()) {
                    self.error(
                        &format!("{ROOT}.ranking.metric_ids[{i}]"),
                        format!("ranking references unknown metric '{id}'"),
                    );
                }
            }
        }
    }

    fn required_id(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => {
                self.error(
                    &format!("{path}.{key}"),
                    format!("{key} must be a non-empty string"),
                );
                None
            }
        }
    }

    fn optional_string(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<String> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.error(&format!("{path}.{key}"), format!("{key} must be a string"));
                None
            }
        }
    }

    fn required_expression(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<Expression> {
        let child = format!("{path}.{key}");
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.error(&child, format!("{key} is required"));
                None
            }
            Some(raw) => self.expression(raw, &child, 1),
        }
    }

    fn optional_expression(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<Expression> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(raw) => self.expression(raw, &format!("{path}.{key}"), 1),
        }
    }

    fn expression(&mut self, raw: &Value, path: &str, depth: usize) -> Option<Expression> {
        if depth > MAX_EXPRESSION_DEPTH {
            self.error(
                path,
                format!("expression nesting exceeds maximum depth of {MAX_EXPRESSION_DEPTH}"),
            );
            return None;
        }
        let Some(obj) = raw.as_object() else {
            self.error(path, "expression must be an object");
            return None;
        };
        let Some(op) = obj.get("op").and_then(Value::as_str) else {
            self.error(path, "expression must have a string 'op'");
            return None;
        };

        match op {
            "const" => {
                let value = self.required_number(obj, path, "value")?;
                Some(Expression::Const(value))
            }
            "answer" => {
                let question_id = self.required_id(obj, path, "question_id");
                let default = self.optional_number(obj, path, "default");
                Some(Expression::Answer {
                    question_id: question_id?,
                    default,
                })
            }
            "metric" => {
                let metric_id = self.required_id(obj, path, "metric_id");
                let default = self.optional_number(obj, path, "default");
                Some(Expression::Metric {
                    metric_id: metric_id?,
                    default,
                })
            }
            "abs" | "neg" => {
                let op = if op == "abs" { UnaryOp::Abs } else { UnaryOp::Neg };
                let arg = match obj.get("arg") {
                    Some(raw) => self.expression(raw, &format!("{path}.arg"), depth + 1),
                    None => {
                        self.error(&format!("{path}.arg"), format!("'{}' requires an arg", op.as_str()));
                        None
                    }
                }?;
                Some(Expression::Unary {
                    op,
                    arg: Box::new(arg),
                })
            }
            "sum" | "min" | "max" => {
                let op = match op {
                    "sum" => VariadicOp::Sum,
                    "min" => VariadicOp::Min,
                    _ => VariadicOp::Max,
                };
                let args = self.args(obj, path, op.as_str(), depth, None)?;
                Some(Expression::Variadic { op, args })
            }
            "sub" | "mul" | "eq" | "neq" | "gt" | "gte" | "lt" | "lte" => {
                let op = match op {
                    "sub" => BinaryOp::Sub,
                    "mul" => BinaryOp::Mul,
                    "eq" => BinaryOp::Eq,
                    "neq" => BinaryOp::Neq,
                    "gt" => BinaryOp::Gt,
                    "gte" => BinaryOp::Gte,
                    "lt" => BinaryOp::Lt,
                    _ => BinaryOp::Lte,
                };
                let (left, right) = self.pair(obj, path, op.as_str(), depth)?;
                Some(Expression::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            "div" => {
                let on_divide_by_zero = self.optional_number(obj, path, "on_divide_by_zero");
                let (numerator, denominator) = self.pair(obj, path, "div", depth)?;
                Some(Expression::Div {
                    numerator: Box::new(numerator),
                    denominator: Box::new(denominator),
                    on_divide_by_zero,
                })
            }
            "clamp" => {
                let value = self.child(obj, path, "value", depth);
                let min_value = self.required_number(obj, path, "min_value");
                let max_value = self.required_number(obj, path, "max_value");
                let (min_value, max_value) = (min_value?, max_value?);
                if min_value > max_value {
                    self.error(
                        path,
                        format!("min_value ({min_value}) must not exceed max_value ({max_value})"),
                    );
                    return None;
                }
                Some(Expression::Clamp {
                    value: Box::new(value?),
                    min_value,
                    max_value,
                })
            }
            "if" => {
                let condition = self.child(obj, path, "condition", depth);
                let then = self.child(obj, path, "then", depth);
                let otherwise = self.child(obj, path, "else", depth);
                Some(Expression::If {
                    condition: Box::new(condition?),
                    then: Box::new(then?),
                    otherwise: Box::new(otherwise?),
                })
            }
            "sum_answers" => {
                let question_ids = match obj.get("question_ids") {
                    Some(v) => self.string_list(v, &format!("{path}.question_ids"), true),
                    None => {
                        self.error(
                            &format!("{path}.question_ids"),
                            "question_ids must be a non-empty array of strings",
                        );
                        None
                    }
                };
                let weights = match obj.get("weights") {
                    None | Some(Value::Null) => Some(BTreeMap::new()),
                    Some(v) => self.number_map(v, &format!("{path}.weights"), false),
                };
                let default = self.optional_number(obj, path, "default");
                Some(Expression::SumAnswers {
                    question_ids: question_ids?,
                    weights: weights?,
                    default,
                })
            }
            "count_matches" => {
                let expected_scores = match obj.get("expected_scores") {
                    Some(v) => self.number_map(v, &format!("{path}.expected_scores"), true),
                    None => {
                        self.error(
                            &format!("{path}.expected_scores"),
                            "expected_scores must be a non-empty object",
                        );
                        None
                    }
                };
                Some(Expression::CountMatches {
                    expected_scores: expected_scores?,
                })
            }
            other => {
                self.error(path, format!("unsupported op '{other}'"));
                None
            }
        }
    }

    fn child(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        key: &str,
        depth: usize,
    ) -> Option<Expression> {
        let child = format!("{path}.{key}");
        match obj.get(key) {
            Some(raw) => self.expression(raw, &child, depth + 1),
            None => {
                self.error(&child, format!("{key} is required"));
                None
            }
        }
    }

    /// Parse `args`, enforcing either an exact arity or at least one argument.
    fn args(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        op: &str,
        depth: usize,
        exact: Option<usize>,
    ) -> Option<Vec<Expression>> {
        let args_path = format!("{path}.args");
        let Some(items) = obj.get("args").and_then(Value::as_array) else {
            self.error(&args_path, format!("'{op}' requires an args array"));
            return None;
        };
        match exact {
            Some(n) if items.len() != n => {
                self.error(
                    &args_path,
                    format!("'{op}' requires exactly {n} arguments, got {}", items.len()),
                );
                return None;
            }
            None if items.is_empty() => {
                self.error(&args_path, format!("'{op}' requires at least 1 argument"));
                return None;
            }
            _ => {}
        }

        let parsed: Vec<Option<Expression>> = items
            .iter()
            .enumerate()
            .map(|(i, raw)| self.expression(raw, &format!("{args_path}[{i}]"), depth + 1))
            .collect();
        parsed.into_iter().collect()
    }

    fn pair(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        op: &str,
        depth: usize,
    ) -> Option<(Expression, Expression)> {
        let mut args = self.args(obj, path, op, depth, Some(2))?;
        let right = args.pop()?;
        let left = args.pop()?;
        Some((left, right))
    }

    fn required_number(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<f64> {
        match obj.get(key) {
            Some(v) => self.finite(v, &format!("{path}.{key}")),
            None => {
                self.error(&format!("{path}.{key}"), format!("{key} is required"));
                None
            }
        }
    }

    fn optional_number(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<f64> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => self.finite(v, &format!("{path}.{key}")),
        }
    }

    fn finite(&mut self, value: &Value, path: &str) -> Option<f64> {
        match value.as_f64() {
            Some(n) if n.is_finite() => Some(n),
            _ => {
                self.error(path, "must be a finite number");
                None
            }
        }
    }

    fn string_list(&mut self, value: &Value, path: &str, non_empty: bool) -> Option<Vec<String>> {
        let Some(items) = value.as_array() else {
            self.error(path, "must be an array of strings");
            return None;
        };
        if non_empty && items.is_empty() {
            self.error(path, "must not be empty");
            return None;
        }
        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) if !s.trim().is_empty() => out.push(s.to_string()),
                _ => {
                    self.error(&format!("{path}[{i}]"), "must be a non-empty string");
                    ok = false;
                }
            }
        }
        ok.then_some(out)
    }

    fn number_map(
        &mut self,
        value: &Value,
        path: &str,
        non_empty: bool,
    ) -> Option<BTreeMap<String, f64>> {
        let Some(obj) = value.as_object() else {
            self.error(path, "must be an object of numbers");
            return None;
        };
        if non_empty && obj.is_empty() {
            self.error(path, "must not be empty");
            return None;
        }
        let mut out = BTreeMap::new();
        let mut ok = true;
        for (key, v) in obj {
            match self.finite(v, &format!("{path}.{key}")) {
                Some(n) => {
                    out.insert(key.clone(), n);
                }
                None => ok = false,
            }
        }
        ok.then_some(out)
    }
}

// ---------------------------------------------------------------------------
// Document loading
// ---------------------------------------------------------------------------

/// Parse a questionnaire JSON string (useful for testing).
pub fn parse_questionnaire_str(content: &str, source_path: &Path) -> Result<Questionnaire, LoadError> {
    serde_json::from_str(content).map_err(|e| LoadError::Malformed {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a questionnaire document from a JSON file.
pub fn load_questionnaire(path: &Path) -> Result<Questionnaire, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_questionnaire_str(&content, path)
}

/// Recursively list all `.json` files under a directory, sorted by path.
pub fn find_json_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.path());

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            found.extend(find_json_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            found.push(path);
        }
    }
    Ok(found)
}

/// Recursively load all `.json` questionnaire documents from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_questionnaire_directory(dir: &Path) -> anyhow::Result<Vec<(PathBuf, Questionnaire)>> {
    let mut found = Vec::new();
    for path in find_json_files(dir)? {
        match load_questionnaire(&path) {
            Ok(q) => found.push((path, q)),
            Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(found)
}

#[derive(Debug, Deserialize)]
struct AnswerRecord {
    score: f64,
}

/// Extract the numeric scores from a raw answer map.
///
/// Entries without a numeric `score` are skipped: they behave like
/// unanswered questions.
pub fn answers_from_value(raw: &Value) -> AnswerMap {
    let mut answers = AnswerMap::new();
    let Some(obj) = raw.as_object() else {
        tracing::warn!("answers must be a JSON object, ignoring");
        return answers;
    };
    for (question_id, entry) in obj {
        match AnswerRecord::deserialize(entry) {
            Ok(record) if record.score.is_finite() => {
                answers.insert(question_id.clone(), record.score);
            }
            _ => tracing::warn!("answer '{question_id}' has no numeric score, skipping"),
        }
    }
    answers
}

/// Parse an answer file's JSON content.
pub fn parse_answers_str(content: &str, source_path: &Path) -> Result<AnswerMap, LoadError> {
    let raw: Value = serde_json::from_str(content).map_err(|e| LoadError::Malformed {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })?;
    if !raw.is_object() {
        return Err(LoadError::Malformed {
            path: source_path.to_path_buf(),
            message: "answers must be a JSON object keyed by question id".into(),
        });
    }
    Ok(answers_from_value(&raw))
}

/// Load an answer file from disk.
pub fn load_answers(path: &Path) -> Result<AnswerMap, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_answers_str(&content, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules_with(expression: Value) -> Value {
        json!({
            "version": 1,
            "metrics": [{ "id": "m", "expression": expression }]
        })
    }

    fn errors_of(raw: &Value) -> Vec<String> {
        validate(raw).errors
    }

    #[test]
    fn normalizes_every_op() {
        let raw = json!({
            "version": 1,
            "metrics": [
                { "id": "a", "title": "A", "precision": 2, "expression": {
                    "op": "sum", "args": [
                        { "op": "const", "value": 1 },
                        { "op": "answer", "question_id": "q1", "default": 0.5 },
                        { "op": "abs", "arg": { "op": "neg", "arg": { "op": "const", "value": 2 } } },
                        { "op": "min", "args": [{ "op": "const", "value": 1 }] },
                        { "op": "max", "args": [{ "op": "const", "value": 1 }] },
                        { "op": "sub", "args": [{ "op": "const", "value": 3 }, { "op": "const", "value": 1 }] },
                        { "op": "mul", "args": [{ "op": "const", "value": 3 }, { "op": "const", "value": 1 }] },
                        { "op": "div", "args": [{ "op": "const", "value": 3 }, { "op": "const", "value": 0 }], "on_divide_by_zero": 7 },
                        { "op": "gte", "args": [{ "op": "const", "value": 3 }, { "op": "const", "value": 1 }] },
                        { "op": "clamp", "value": { "op": "const", "value": 9 }, "min_value": 0, "max_value": 5 },
                        { "op": "if", "condition": { "op": "const", "value": 1 },
                          "then": { "op": "const", "value": 1 }, "else": { "op": "const", "value": 0 } },
                        { "op": "sum_answers", "question_ids": ["q1", "q2"], "weights": { "q1": 2 } },
                        { "op": "count_matches", "expected_scores": { "q1": 1 } }
                    ]
                }},
                { "id": "b", "expression": { "op": "metric", "metric_id": "a", "default": 0 } }
            ],
            "ranking": { "metric_ids": ["a", "b"], "top_n": 1 },
            "honesty_checks": [
                { "id": "lie", "severity": "critical",
                  "pass_expression": { "op": "lt", "args": [{ "op": "const", "value": 1 }, { "op": "const", "value": 2 }] } }
            ]
        });

        let rules = normalize_rule_set(&raw).unwrap();
        assert_eq!(rules.version, 1);
        assert_eq!(rules.metrics.len(), 2);
        assert_eq!(rules.metrics[0].precision, Some(2));
        assert_eq!(rules.metrics[0].title.as_deref(), Some("A"));
        assert_eq!(rules.honesty_checks[0].severity, Severity::Critical);
        assert_eq!(rules.ranking.as_ref().unwrap().top_n, Some(1));
        match &rules.metrics[0].expression {
            Expression::Variadic { op, args } => {
                assert_eq!(*op, VariadicOp::Sum);
                assert_eq!(args.len(), 13);
            }
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_op() {
        let raw = rules_with(json!({ "op": "eval", "code": "process.exit()" }));
        assert!(normalize(&raw).is_none());
        let report = validate(&raw);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("unsupported op 'eval'")));
        assert!(report.errors[0].starts_with("processing_rules.metrics[0].expression"));
    }

    #[test]
    fn reports_paths_into_args() {
        let raw = json!({
            "version": 1,
            "metrics": [
                { "id": "ok", "expression": { "op": "const", "value": 1 } },
                { "id": "ok2", "expression": { "op": "const", "value": 1 } },
                { "id": "bad", "expression": { "op": "sum", "args": [{ "op": "nope" }] } }
            ]
        });
        let errors = errors_of(&raw);
        assert_eq!(
            errors,
            vec!["processing_rules.metrics[2].expression.args[0]: unsupported op 'nope'"]
        );
    }

    #[test]
    fn enforces_arity() {
        let empty_sum = rules_with(json!({ "op": "sum", "args": [] }));
        assert!(errors_of(&empty_sum)[0].contains("at least 1 argument"));

        let three_sub = rules_with(json!({ "op": "sub", "args": [
            { "op": "const", "value": 1 }, { "op": "const", "value": 1 }, { "op": "const", "value": 1 }
        ]}));
        assert!(errors_of(&three_sub)[0].contains("exactly 2 arguments, got 3"));
    }

    #[test]
    fn rejects_non_numeric_literals_and_inverted_clamp() {
        let literal = rules_with(json!({ "op": "const", "value": "Infinity" }));
        assert!(errors_of(&literal)[0].contains("finite number"));

        let clamp = rules_with(json!({
            "op": "clamp", "value": { "op": "const", "value": 1 }, "min_value": 5, "max_value": 1
        }));
        assert!(errors_of(&clamp)[0].contains("must not exceed max_value"));
    }

    #[test]
    fn rejects_empty_question_lists() {
        let sum = rules_with(json!({ "op": "sum_answers", "question_ids": [] }));
        assert!(errors_of(&sum)[0].contains("question_ids: must not be empty"));

        let count = rules_with(json!({ "op": "count_matches", "expected_scores": {} }));
        assert!(errors_of(&count)[0].contains("expected_scores: must not be empty"));
    }

    #[test]
    fn collects_all_errors() {
        let raw = json!({
            "version": 2,
            "metrics": [
                { "id": "dup", "expression": { "op": "const", "value": 1 } },
                { "id": "dup", "expression": { "op": "const", "value": 2 } }
            ],
            "ranking": { "metric_ids": ["ghost"], "top_n": 0 },
            "honesty_checks": [
                { "id": "h", "pass_expression": { "op": "const", "value": 1 } },
                { "id": "h", "pass_expression": { "op": "const", "value": 1 }, "severity": "fatal" }
            ]
        });
        let errors = errors_of(&raw);
        assert!(errors.iter().any(|e| e.contains("unsupported version 2")));
        assert!(errors.iter().any(|e| e.contains("duplicate metric id 'dup'")));
        assert!(errors.iter().any(|e| e.contains("duplicate honesty check id 'h'")));
        assert!(errors.iter().any(|e| e.contains("unknown metric 'ghost'")));
        assert!(errors.iter().any(|e| e.contains("top_n must be a positive integer")));
        assert!(errors.iter().any(|e| e.contains("severity must be one of")));
    }

    #[test]
    fn rejects_empty_rule_set() {
        let errors = errors_of(&json!({ "version": 1, "metrics": [] }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least one of metrics, score or honesty_checks"));
    }

    #[test]
    fn rejects_non_object_and_missing_version() {
        assert!(errors_of(&json!([1, 2]))[0].contains("must be an object"));
        let errors = errors_of(&json!({ "metrics": [{ "id": "m", "expression": { "op": "const", "value": 1 } }] }));
        assert!(errors[0].contains("version is required"));
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut expr = json!({ "op": "const", "value": 1 });
        for _ in 0..200 {
            expr = json!({ "op": "abs", "arg": expr });
        }
        let errors = errors_of(&rules_with(expr));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("maximum depth of 48"));
    }

    #[test]
    fn score_override_defaults_to_clamping() {
        let raw = json!({
            "version": 1,
            "score": {
                "total_expression": { "op": "const", "value": 5 },
                "max_expression": { "op": "const", "value": 10 }
            }
        });
        let rules = normalize(&raw).unwrap();
        let score = rules.score.unwrap();
        assert!(score.clamp_percentage);
        assert!(score.percentage_expression.is_none());
    }

    #[test]
    fn precision_out_of_range() {
        let raw = json!({
            "version": 1,
            "metrics": [{ "id": "m", "precision": 7, "expression": { "op": "const", "value": 1 } }]
        });
        assert!(errors_of(&raw)[0].contains("precision must be an integer between 0 and 6"));
    }

    #[test]
    fn questionnaire_without_rules_is_not_applicable() {
        let q = parse_questionnaire_str(r#"{"id": "q", "processing_rules": null}"#, Path::new("q.json"))
            .unwrap();
        assert!(questionnaire_rules(&q).is_none());
    }

    #[test]
    fn parse_answers_skips_missing_scores() {
        let answers = parse_answers_str(
            r#"{"q1": {"score": 2, "answered_at": "x"}, "q2": {"text": "skip"}, "q3": {"score": 0.5}}"#,
            Path::new("a.json"),
        )
        .unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers["q1"], 2.0);
        assert_eq!(answers["q3"], 0.5);
    }

    #[test]
    fn parse_malformed_answers() {
        assert!(parse_answers_str("not json", Path::new("bad.json")).is_err());
        assert!(parse_answers_str("[1]", Path::new("bad.json")).is_err());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"id": "a"}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = load_questionnaire_directory(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.id, "a");
    }

    #[test]
    fn single_expression() {
        let expr = normalize_expression(&json!({ "op": "const", "value": 2 }), "total").unwrap();
        assert_eq!(expr, Expression::Const(2.0));

        let errors = normalize_expression(
            &json!({ "op": "neg", "arg": { "op": "pow" } }),
            "score.total_expression",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "score.total_expression.arg: unsupported op 'pow'"
        );
    }
}
