//! Scoring-run orchestrator.
//!
//! [`RulesEngine::apply`] performs one synchronous scoring run: resolve every
//! metric, rank them, then evaluate the score override and honesty checks
//! against the same context. [`RulesEngine::score_batch`] fans many
//! independent runs out over a bounded pool of blocking workers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::context::{EvalLimits, EvaluationContext};
use crate::honesty::{evaluate_honesty_checks, HonestyReport};
use crate::model::{AnswerMap, RuleSet};
use crate::ranking::rank_metrics;
use crate::resolver::resolve_all;
use crate::score::{compute_score_override, ScoreOverrideResult};

/// Everything one scoring run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    /// `false` when there were no rules to execute.
    pub applied: bool,
    pub metrics: BTreeMap<String, f64>,
    pub ranking: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honesty_checks: Option<HonestyReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_override: Option<ScoreOverrideResult>,
    /// Non-fatal diagnostics. The rest of the outcome is still usable.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ProcessingOutcome {
    /// The outcome for a questionnaire without processing rules.
    pub fn not_applied() -> Self {
        Self::default()
    }
}

/// Configuration for the rules engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent scoring runs in a batch.
    pub parallelism: usize,
    /// Per-run evaluation budgets.
    pub limits: EvalLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            limits: EvalLimits::default(),
        }
    }
}

/// One learner's answers to score.
#[derive(Debug, Clone)]
pub struct Respondent {
    pub id: String,
    pub answers: AnswerMap,
}

/// The outcome of scoring one respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondentOutcome {
    pub respondent: String,
    pub outcome: ProcessingOutcome,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_respondent_complete(&self, result: &RespondentOutcome);
    fn on_respondent_error(&self, respondent: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_respondent_complete(&self, _: &RespondentOutcome) {}
    fn on_respondent_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The processing rules engine.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    config: EngineConfig,
}

impl RulesEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the rules once against a set of answers.
    pub fn apply(&self, rules: &RuleSet, answers: &AnswerMap) -> ProcessingOutcome {
        if !rules.has_content() {
            return ProcessingOutcome::not_applied();
        }

        let mut ctx = EvaluationContext::with_limits(rules, answers, self.config.limits);

        let resolved = resolve_all(&mut ctx);
        let ranking = if resolved.is_empty() {
            Vec::new()
        } else {
            rank_metrics(&resolved, rules.ranking.as_ref())
        };

        let score_override = rules
            .score
            .as_ref()
            .and_then(|score| compute_score_override(score, &mut ctx));

        let honesty_checks = if rules.honesty_checks.is_empty() {
            None
        } else {
            Some(evaluate_honesty_checks(&rules.honesty_checks, &mut ctx))
        };

        tracing::debug!(
            metrics = resolved.len(),
            nodes = ctx.nodes_visited(),
            errors = ctx.errors().len(),
            "processing rules applied"
        );

        ProcessingOutcome {
            applied: true,
            metrics: resolved.into_iter().collect(),
            ranking,
            honesty_checks,
            score_override,
            errors: ctx.into_errors(),
        }
    }

    /// Apply optional rules. `None` means the engine does not apply.
    pub fn apply_optional(&self, rules: Option<&RuleSet>, answers: &AnswerMap) -> ProcessingOutcome {
        match rules {
            Some(rules) => self.apply(rules, answers),
            None => ProcessingOutcome::not_applied(),
        }
    }

    /// Score many respondents concurrently.
    ///
    /// Runs share nothing but the immutable rule set. Results are returned
    /// sorted by respondent id regardless of completion order.
    pub async fn score_batch(
        &self,
        rules: Arc<RuleSet>,
        respondents: Vec<Respondent>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<RespondentOutcome>> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for respondent in respondents {
            let rules = Arc::clone(&rules);
            let semaphore = Arc::clone(&semaphore);
            let engine = self.clone();

            futures.push(async move {
                let id = respondent.id.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    let outcome = tokio::task::spawn_blocking(move || {
                        engine.apply(&rules, &respondent.answers)
                    })
                    .await?;
                    Ok::<_, anyhow::Error>(outcome)
                };
                let result = inner.await.map(|outcome| RespondentOutcome {
                    respondent: id.clone(),
                    outcome,
                });
                (id, result)
            });
        }

        let mut results = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let total = futures.len();

        while let Some((id, result)) = futures.next().await {
            match result {
                Ok(outcome) => {
                    progress.on_respondent_complete(&outcome);
                    results.push(outcome);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("scoring failed for {id}: {e:#}");
                    progress.on_respondent_error(&id, &e.to_string());
                    failed += 1;
                }
            }
        }

        progress.on_batch_complete(total, completed, failed, start.elapsed());
        results.sort_by(|a, b| a.respondent.cmp(&b.respondent));
        Ok(results)
    }
}
