//! Markdown scoreboard over persisted evaluation results.
//!
//! Reads every `*_results.json` under the benchmarks directory, computes
//! per-subject stats plus an `ALL` aggregate row, and renders one report.
//! When a scan root is given, raw scan counts (including the QA bucket)
//! come from the original scan files; otherwise the scan total falls back
//! to `matched + partial + fp`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::loader::load_evaluation;
use crate::metrics::{ConfusionMetrics, SubjectCounts, SubjectStats, aggregate, norm_sev_bucket};
use crate::{Result, ScoringError};

const SEVERITY_COLUMNS: [&str; 5] = ["high", "medium", "low", "info", "bestpractices"];

pub fn format_pct(x: f64) -> String {
  format!("{:.1}%", x * 100.0)
}

fn subject_from_results_file(path: &Path) -> Option<String> {
  let stem = path.file_stem()?.to_str()?;
  stem.strip_suffix("_results").map(str::to_string)
}

/// Count scan findings per severity bucket from a raw scan file.
fn scan_severity_counts(path: &Path) -> Option<BTreeMap<String, usize>> {
  let text = std::fs::read_to_string(path).ok()?;
  let items: Vec<Value> = serde_json::from_str(&text).ok()?;

  let mut counts = BTreeMap::new();
  for item in &items {
    let severity = item
      .get("Severity")
      .or_else(|| item.get("severity"))
      .and_then(Value::as_str)
      .unwrap_or("");
    *counts.entry(norm_sev_bucket(severity).to_string()).or_insert(0usize) += 1;
  }
  Some(counts)
}

/// Build one subject's stats from its persisted evaluation records.
pub fn compute_subject_stats(eval_path: &Path, scan_root: Option<&Path>) -> Result<SubjectStats> {
  let subject = subject_from_results_file(eval_path)
    .ok_or_else(|| ScoringError::UnsupportedShape(eval_path.to_path_buf()))?;
  let records = load_evaluation(eval_path)?;

  let inventory = scan_root.and_then(|root| {
    let scan_file = root.join(format!("{subject}_results.json"));
    let counts = scan_severity_counts(&scan_file)?;
    let scanned: usize = counts.values().sum();
    let qa = counts.get("info").copied().unwrap_or(0) + counts.get("bestpractices").copied().unwrap_or(0);
    Some((scanned, qa, counts))
  });

  let scan_inventory = inventory.as_ref().map(|(scanned, qa, _)| (*scanned, *qa));
  let counts = SubjectCounts::from_records(&records, scan_inventory);
  let mut stats = SubjectStats::new(subject, counts, &records);

  // severity breakdown from the scan source is more faithful than the
  // one reconstructed from records
  if let Some((_, _, scan_counts)) = inventory {
    stats.scan_severities = scan_counts;
  }

  Ok(stats)
}

fn severity_table(counts: &BTreeMap<String, usize>) -> Vec<String> {
  let cells: Vec<String> = SEVERITY_COLUMNS
    .iter()
    .map(|k| counts.get(*k).copied().unwrap_or(0).to_string())
    .collect();
  vec![
    "| high | medium | low | info | bestpractices |".to_string(),
    "|------|--------|-----|------|----------------|".to_string(),
    format!("| {} |", cells.join(" | ")),
  ]
}

fn overview_row(name: &str, counts: &SubjectCounts, metrics: &ConfusionMetrics) -> String {
  format!(
    "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
    name,
    counts.actual,
    counts.scanned,
    counts.qa,
    counts.matched,
    counts.partial,
    metrics.false_positives,
    metrics.false_negatives,
    format_pct(metrics.precision),
    format_pct(metrics.recall),
    format_pct(metrics.f1),
    format_pct(metrics.precision_with_partial),
    format_pct(metrics.recall_with_partial),
    format_pct(metrics.f1_with_partial),
  )
}

/// Render the full markdown report for a set of subjects.
pub fn render_markdown(stats: &[SubjectStats]) -> String {
  let (totals, total_metrics) = aggregate(stats);
  let generated = Utc::now().format("%Y-%m-%d %H:%M UTC");

  let mut lines: Vec<String> = Vec::new();
  lines.push("# Benchmark Report".to_string());
  lines.push(String::new());
  lines.push(format!("_Generated: {generated}_"));
  lines.push(String::new());

  lines.push("## Overview".to_string());
  lines.push(String::new());
  lines.push(
    "| Repo | Truth | AI Scan | QA | TP | Partial | FP | FN | Precision | Recall | F1 | P(w/partial) | R(w/partial) | F1(w/partial) |"
      .to_string(),
  );
  lines.push(
    "|------|--------|------|----|----|---------|----|----|-----------|--------|----|--------------|--------------|---------------|"
      .to_string(),
  );
  for s in stats {
    lines.push(overview_row(&s.subject, &s.counts, &s.metrics));
  }
  lines.push(overview_row("ALL", &totals, &total_metrics));
  lines.push(String::new());

  for s in stats {
    lines.push(format!("## {}", s.subject));
    lines.push(String::new());
    lines.push(format!("- **actual findings (truth, all severities)**: {}", s.counts.actual));
    lines.push(format!("- **scan findings (raw)**: {}", s.counts.scanned));
    lines.push(format!(
      "- **QA findings (from scan: Info + Best Practices)**: {}",
      s.counts.qa
    ));
    lines.push(format!("- **true positives (exact matches)**: {}", s.counts.matched));
    lines.push(format!("- **partial matches**: {}", s.counts.partial));
    lines.push(format!("- **false positives (adjusted)**: {}", s.metrics.false_positives));
    lines.push(format!("- **false negatives**: {}", s.metrics.false_negatives));
    lines.push(format!("- **precision**: {}", format_pct(s.metrics.precision)));
    lines.push(format!("- **recall**: {}", format_pct(s.metrics.recall)));
    lines.push(format!("- **F1**: {}", format_pct(s.metrics.f1)));
    lines.push(format!(
      "- **precision w/ partial**: {}",
      format_pct(s.metrics.precision_with_partial)
    ));
    lines.push(format!(
      "- **recall w/ partial**: {}",
      format_pct(s.metrics.recall_with_partial)
    ));
    lines.push(format!("- **F1 w/ partial**: {}", format_pct(s.metrics.f1_with_partial)));
    lines.push(String::new());

    if !s.truth_severities.is_empty() {
      lines.push("Truth severity counts:".to_string());
      lines.push(String::new());
      lines.extend(severity_table(&s.truth_severities));
      lines.push(String::new());
    }
    if !s.scan_severities.is_empty() {
      lines.push("Scan severity counts (from scan source):".to_string());
      lines.push(String::new());
      lines.extend(severity_table(&s.scan_severities));
      lines.push(String::new());
    }
  }

  lines.join("\n")
}

/// Generate the report from every `*_results.json` under `benchmarks`.
pub fn generate_markdown_report(benchmarks: &Path, out: &Path, scan_root: Option<&Path>) -> Result<()> {
  if !benchmarks.is_dir() {
    return Err(ScoringError::MissingInput(benchmarks.to_path_buf()));
  }

  let mut results_files: Vec<_> = std::fs::read_dir(benchmarks)?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|p| {
      p.is_file()
        && p
          .file_name()
          .and_then(|n| n.to_str())
          .is_some_and(|n| n.ends_with("_results.json"))
    })
    .collect();
  results_files.sort();

  if results_files.is_empty() {
    return Err(ScoringError::MissingInput(benchmarks.join("*_results.json")));
  }

  let mut stats = Vec::with_capacity(results_files.len());
  for path in &results_files {
    match compute_subject_stats(path, scan_root) {
      Ok(s) => stats.push(s),
      Err(e) => warn!(path = %path.display(), err = %e, "Skipping unreadable results file"),
    }
  }

  let markdown = render_markdown(&stats);
  let final_out = if out.is_absolute() {
    out.to_path_buf()
  } else {
    benchmarks.join(out)
  };
  std::fs::write(&final_out, markdown)?;
  debug!(out = %final_out.display(), subjects = stats.len(), "Wrote report");
  Ok(())
}
