//! `quizrules.toml` configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizrules_core::context::{
    EvalLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES, MAX_DEPTH_LIMIT, MAX_NODES_LIMIT,
};
use quizrules_core::engine::EngineConfig;

/// Top-level quizrules configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizrulesConfig {
    /// Evaluation depth limit per scoring run.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Expression nodes one scoring run may visit.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Max concurrent scoring runs in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for batch reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./quizrules-results")
}

impl Default for QuizrulesConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
        }
    }
}

impl QuizrulesConfig {
    pub fn limits(&self) -> EvalLimits {
        EvalLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            parallelism: self.parallelism,
            limits: self.limits(),
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_depth >= 1, "max_depth must be at least 1");
        anyhow::ensure!(
            self.max_depth <= MAX_DEPTH_LIMIT,
            "max_depth must be at most {MAX_DEPTH_LIMIT}, got {}",
            self.max_depth
        );
        anyhow::ensure!(self.max_nodes >= 1, "max_nodes must be at least 1");
        anyhow::ensure!(
            self.max_nodes <= MAX_NODES_LIMIT,
            "max_nodes must be at most {MAX_NODES_LIMIT}, got {}",
            self.max_nodes
        );
        anyhow::ensure!(self.parallelism >= 1, "parallelism must be at least 1");
        Ok(())
    }

    /// Apply `QUIZRULES_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let fields: [(&str, &mut usize); 3] = [
            ("QUIZRULES_MAX_DEPTH", &mut self.max_depth),
            ("QUIZRULES_MAX_NODES", &mut self.max_nodes),
            ("QUIZRULES_PARALLELISM", &mut self.parallelism),
        ];
        for (var, field) in fields {
            if let Some(raw) = lookup(var) {
                *field = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{var} must be a positive integer, got '{raw}'"))?;
            }
        }
        Ok(())
    }
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order:
/// 1. `quizrules.toml` in the current directory
/// 2. `~/.config/quizrules/config.toml`
///
/// Environment variable overrides: `QUIZRULES_MAX_DEPTH`,
/// `QUIZRULES_MAX_NODES`, `QUIZRULES_PARALLELISM`.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizrulesConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizrules.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config(path)?,
        None => QuizrulesConfig::default(),
    };

    config.apply_overrides(|var| std::env::var(var).ok())?;
    config.validate()?;

    tracing::debug!(?config_path, ?config, "configuration loaded");
    Ok(config)
}

fn parse_config(path: &Path) -> Result<QuizrulesConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<QuizrulesConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizrules"))
}
