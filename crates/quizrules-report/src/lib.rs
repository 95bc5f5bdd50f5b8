//! quizrules-report: Human- and tool-facing renderings of quizrules output.
//!
//! Markdown summaries of batch scoring reports, and SARIF 2.1.0 documents
//! for authoring errors in `processing_rules`.

pub mod markdown;
pub mod sarif;
