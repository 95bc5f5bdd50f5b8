//! Metric ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::RankingConfig;

/// Order metric ids by value, highest first.
///
/// `resolved` is in declaration order. Ties keep the candidate order.
pub fn rank_metrics(resolved: &[(String, f64)], config: Option<&RankingConfig>) -> Vec<String> {
    let values: HashMap<&str, f64> = resolved.iter().map(|(id, v)| (id.as_str(), *v)).collect();

    let mut candidates: Vec<(&str, f64)> = match config.and_then(|c| c.metric_ids.as_ref()) {
        Some(ids) if !ids.is_empty() => ids
            .iter()
            .filter_map(|id| values.get(id.as_str()).map(|v| (id.as_str(), *v)))
            .collect(),
        _ => resolved.iter().map(|(id, v)| (id.as_str(), *v)).collect(),
    };

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    if let Some(top_n) = config.and_then(|c| c.top_n) {
        candidates.truncate(top_n);
    }

    candidates.into_iter().map(|(id, _)| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn ranks_all_metrics_without_config() {
        let r = resolved(&[("a", 10.0), ("b", 5.0), ("c", 8.0)]);
        assert_eq!(rank_metrics(&r, None), ["a", "c", "b"]);
    }

    #[test]
    fn top_n_truncates_after_sorting() {
        let r = resolved(&[("a", 10.0), ("b", 5.0), ("c", 8.0)]);
        let config = RankingConfig {
            metric_ids: None,
            top_n: Some(2),
        };
        assert_eq!(rank_metrics(&r, Some(&config)), ["a", "c"]);
    }

    #[test]
    fn ties_keep_candidate_order() {
        let r = resolved(&[("x", 1.0), ("y", 3.0), ("z", 1.0), ("w", 3.0)]);
        assert_eq!(rank_metrics(&r, None), ["y", "w", "x", "z"]);

        let config = RankingConfig {
            metric_ids: Some(vec!["z".into(), "x".into()]),
            top_n: None,
        };
        assert_eq!(rank_metrics(&r, Some(&config)), ["z", "x"]);
    }

    #[test]
    fn subset_ignores_unresolved_ids() {
        let r = resolved(&[("a", 1.0), ("b", 2.0)]);
        let config = RankingConfig {
            metric_ids: Some(vec!["a".into(), "missing".into()]),
            top_n: Some(5),
        };
        assert_eq!(rank_metrics(&r, Some(&config)), ["a"]);
    }

    #[test]
    fn empty_subset_means_all() {
        let r = resolved(&[("a", 1.0), ("b", 2.0)]);
        let config = RankingConfig {
            metric_ids: Some(vec![]),
            top_n: None,
        };
        assert_eq!(rank_metrics(&r, Some(&config)), ["b", "a"]);
    }
}
