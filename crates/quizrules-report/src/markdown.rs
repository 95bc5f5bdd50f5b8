//! Markdown report generator.

use std::path::Path;

use anyhow::{Context, Result};

use quizrules_core::report::ScoringReport;

/// Escape characters that would break a Markdown table cell.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Generate a Markdown summary of a batch scoring report.
pub fn generate_markdown(report: &ScoringReport) -> String {
    let mut md = String::new();
    let q = &report.questionnaire;
    let agg = &report.aggregate;

    let title = if q.title.is_empty() { &q.id } else { &q.title };
    md.push_str(&format!("# quizrules report: {}\n\n", cell(title)));
    md.push_str(&format!(
        "Questionnaire `{}` | {} questions | {} metrics | {} respondents | {}\n\n",
        q.id,
        q.question_count,
        q.metric_count,
        agg.respondents,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "**Applied:** {} of {} | **With diagnostics:** {} | **Duration:** {}ms\n\n",
        agg.applied, agg.respondents, agg.respondents_with_errors, report.duration_ms
    ));
    if let Some(pct) = agg.mean_percentage {
        md.push_str(&format!("**Mean score:** {pct:.1}%\n\n"));
    }

    if !agg.per_metric.is_empty() {
        md.push_str("## Metrics\n\n");
        md.push_str("| Metric | Mean | Min | Max | Std dev | Ranked first |\n");
        md.push_str("|--------|------|-----|-----|---------|--------------|\n");
        for (id, stats) in &agg.per_metric {
            md.push_str(&format!(
                "| {} | {:.2} | {:.2} | {:.2} | {:.2} | {} |\n",
                cell(id),
                stats.mean,
                stats.min,
                stats.max,
                stats.std_dev,
                agg.top_ranked.get(id).copied().unwrap_or(0)
            ));
        }
        md.push('\n');
    }

    if !agg.per_check.is_empty() {
        md.push_str("## Honesty checks\n\n");
        md.push_str("| Check | Severity | Failed | Pass rate |\n");
        md.push_str("|-------|----------|--------|-----------|\n");
        for (id, stats) in &agg.per_check {
            md.push_str(&format!(
                "| {} | {} | {} / {} | {:.1}% |\n",
                cell(id),
                stats.severity,
                stats.failed,
                stats.evaluated,
                stats.pass_rate * 100.0
            ));
        }
        md.push('\n');

        let flagged: Vec<&str> = report
            .critical_failures()
            .map(|r| r.respondent.as_str())
            .collect();
        if !flagged.is_empty() {
            md.push_str(&format!(
                "**Critical failures:** {}\n\n",
                flagged
                    .iter()
                    .map(|r| format!("`{r}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
    }

    md.push_str("## Respondents\n\n");
    md.push_str("| Respondent | Top metric | Score | Honesty | Diagnostics |\n");
    md.push_str("|------------|------------|-------|---------|-------------|\n");
    for r in &report.results {
        let o = &r.outcome;
        let top = o.ranking.first().map(String::as_str).unwrap_or("-");
        let score = o
            .score_override
            .as_ref()
            .map(|s| format!("{} / {} ({}%)", s.total_score, s.max_possible_score, s.percentage))
            .unwrap_or_else(|| "-".into());
        let honesty = match &o.honesty_checks {
            Some(h) if h.all_passed => "pass".to_string(),
            Some(h) => format!("{} failed", h.failed_count),
            None => "-".into(),
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            cell(&r.respondent),
            cell(top),
            score,
            honesty,
            o.errors.len()
        ));
    }

    let with_errors: Vec<_> = report
        .results
        .iter()
        .filter(|r| !r.outcome.errors.is_empty())
        .collect();
    if !with_errors.is_empty() {
        md.push_str("\n## Diagnostics\n\n");
        for r in with_errors {
            md.push_str(&format!("- `{}`\n", r.respondent));
            for e in &r.outcome.errors {
                md.push_str(&format!("  - {e}\n"));
            }
        }
    }

    md
}

/// Write a Markdown report to a file.
pub fn write_markdown_report(report: &ScoringReport, path: &Path) -> Result<()> {
    let md = generate_markdown(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, md)
        .with_context(|| format!("failed to write markdown report to {}", path.display()))?;
    Ok(())
}
