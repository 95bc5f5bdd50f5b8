//! Error types for processing rules.
//!
//! `RuleError` is an authoring error found while normalizing untrusted
//! `processing_rules` input. Normalization collects every one it finds, so
//! callers always see the full list rather than the first failure.

use std::path::PathBuf;

use thiserror::Error;

/// A single authoring error, located by its path inside `processing_rules`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct RuleError {
    /// Dotted path to the offending node, e.g. `processing_rules.metrics[2].expression`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl RuleError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur when loading questionnaire documents or answer files.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has the wrong top-level shape.
    #[error("failed to parse {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

impl LoadError {
    /// Returns the path of the file that failed to load.
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Io { path, .. } | LoadError::Malformed { path, .. } => path,
        }
    }
}
