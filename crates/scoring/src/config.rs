//! Run configuration for the evaluation pipeline.
//!
//! All tunables travel in one explicit `Settings` value passed into the
//! orchestrator's entry point; there is no process-wide mutable config.
//! Values come from a TOML file and may be overridden by CLI flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Result, ScoringError};

/// Judge models accepted by the Claude CLI provider.
pub const SUPPORTED_MODELS: &[&str] = &["haiku", "sonnet", "opus"];

/// One run's worth of configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Subjects (benchmark repos) to evaluate
  pub subjects: Vec<String>,
  /// Judge model
  pub model: String,
  /// Judge calls per (truth item, batch) pair
  pub iterations: usize,
  /// Candidate findings per judge prompt
  pub batch_size: usize,
  /// Which scanner output to compare against truth
  pub scan_source: String,
  /// Root directory holding `source_of_truth/` and scanner outputs
  pub data_root: PathBuf,
  /// Directory for persisted evaluation results
  pub output_root: PathBuf,
  /// Whether to write the rendered judge prompt beside results
  pub debug_prompt: bool,
  /// Per-call judge timeout in seconds
  pub judge_timeout_secs: u64,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      subjects: Vec::new(),
      model: "haiku".to_string(),
      iterations: 3,
      batch_size: 10,
      scan_source: "scanner".to_string(),
      data_root: PathBuf::from("./data"),
      output_root: PathBuf::from("./benchmarks"),
      debug_prompt: false,
      judge_timeout_secs: 60,
    }
  }
}

impl Settings {
  /// Load settings from a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
  }

  /// Load settings from a TOML file, or fall back to defaults when the
  /// file does not exist.
  pub fn load_or_default(path: &Path) -> Result<Self> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }

  /// Validate settings before any evaluation begins.
  ///
  /// An unsupported judge model or degenerate batching setup is fatal up
  /// front rather than mid-run.
  pub fn validate(&self) -> Result<()> {
    if !SUPPORTED_MODELS.contains(&self.model.as_str()) {
      return Err(ScoringError::Config(format!(
        "Unsupported judge model '{}'. Supported: {}",
        self.model,
        SUPPORTED_MODELS.join(", ")
      )));
    }
    if self.iterations == 0 {
      return Err(ScoringError::Config("iterations must be at least 1".to_string()));
    }
    if self.batch_size == 0 {
      return Err(ScoringError::Config("batch_size must be at least 1".to_string()));
    }
    Ok(())
  }
}

/// Resolve the subjects for a run.
///
/// Without requests the configured list runs as-is. Each request is a
/// glob pattern matched against the configured subjects; a request that
/// matches nothing is taken as a literal subject name so new subjects can
/// be run without editing the config file first.
pub fn select_subjects(configured: &[String], requested: &[String]) -> Vec<String> {
  if requested.is_empty() {
    return configured.to_vec();
  }

  let mut selected = Vec::new();
  for request in requested {
    let matched: Vec<&String> = match glob::Pattern::new(request) {
      Ok(pattern) => configured.iter().filter(|s| pattern.matches(s)).collect(),
      Err(_) => configured.iter().filter(|s| *s == request).collect(),
    };
    if matched.is_empty() {
      if !selected.contains(request) {
        selected.push(request.clone());
      }
    } else {
      for subject in matched {
        if !selected.contains(subject) {
          selected.push(subject.clone());
        }
      }
    }
  }
  selected
}
