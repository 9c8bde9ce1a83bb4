//! Scanner accuracy benchmark for curated ground-truth audits.
//!
//! Evaluates an automated scanner's findings against a curated truth list
//! using an LLM judge, then turns per-item verdicts into confusion-matrix
//! metrics.
//!
//! ## Key Concepts
//!
//! - **Consensus**: 1-3 judge calls per (truth item, batch) pair, reduced
//!   to one representative verdict by tie-break rules
//! - **Working set**: the live, shrinking pool of unconsumed candidate
//!   findings; a full match removes its candidate for the rest of the run
//! - **Reports**: persisted JSON evaluation records per subject plus a
//!   Markdown overview with strict and partial-inclusive metrics

pub mod config;
pub mod consensus;
pub mod evaluate;
pub mod judge;
pub mod loader;
pub mod metrics;
pub mod reports;
pub mod types;

pub use config::Settings;
pub use evaluate::{EvalOptions, Evaluator};
pub use judge::{Judge, JudgeOutcome, LlmJudge};
pub use metrics::SubjectStats;
pub use reports::generate_markdown_report;
pub use types::{CandidateFinding, EvaluationRecord, Severity, TruthFinding, Verdict};

use std::path::PathBuf;

use thiserror::Error;

/// Scoring-specific errors
#[derive(Debug, Error)]
pub enum ScoringError {
  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Missing input: {}", .0.display())]
  MissingInput(PathBuf),

  #[error("Unsupported data format in {}", .0.display())]
  UnsupportedShape(PathBuf),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("TOML parse error: {0}")]
  Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ScoringError>;
