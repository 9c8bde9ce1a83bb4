//! Confusion-matrix arithmetic over evaluation records.
//!
//! Raw counts and derived ratios are kept separate on purpose: cross-subject
//! aggregation sums the counts and recomputes the ratios from the sums.
//! Averaging per-subject ratios would weight small subjects the same as
//! large ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::EvaluationRecord;

/// Raw per-subject tallies, summable across subjects.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubjectCounts {
  /// Truth items that produced a record.
  pub actual: usize,
  /// Total candidates the scanner produced.
  pub scanned: usize,
  /// Full matches.
  pub matched: usize,
  /// Retained partial matches.
  pub partial: usize,
  /// False positives.
  pub fp: usize,
  /// Candidates with informational or best-practices severity.
  pub qa: usize,
}

impl SubjectCounts {
  /// Tally records; `scanned` and `qa` come from the scan inventory when
  /// known, otherwise `scanned` falls back to `matched + partial + fp`.
  pub fn from_records(records: &[EvaluationRecord], scan_inventory: Option<(usize, usize)>) -> Self {
    let matched = records.iter().filter(|r| r.is_match).count();
    let partial = records.iter().filter(|r| r.is_partial_match && !r.is_match).count();
    let fp = records.iter().filter(|r| r.is_fp).count();
    let actual = records.iter().filter(|r| !r.is_fp).count();
    let (scanned, qa) = scan_inventory.unwrap_or((matched + partial + fp, 0));

    Self {
      actual,
      scanned,
      matched,
      partial,
      fp,
      qa,
    }
  }

  pub fn add(&mut self, other: &SubjectCounts) {
    self.actual += other.actual;
    self.scanned += other.scanned;
    self.matched += other.matched;
    self.partial += other.partial;
    self.fp += other.fp;
    self.qa += other.qa;
  }
}

/// Derived confusion-matrix figures, strict and partial-inclusive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfusionMetrics {
  pub tp: usize,
  pub false_negatives: usize,
  pub false_positives: usize,
  pub precision: f64,
  pub recall: f64,
  pub f1: f64,
  pub precision_with_partial: f64,
  pub recall_with_partial: f64,
  pub f1_with_partial: f64,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
  if denominator > 0 {
    numerator as f64 / denominator as f64
  } else {
    0.0
  }
}

fn f1(precision: f64, recall: f64) -> f64 {
  if precision + recall > 0.0 {
    2.0 * precision * recall / (precision + recall)
  } else {
    0.0
  }
}

impl ConfusionMetrics {
  pub fn compute(counts: &SubjectCounts) -> Self {
    let tp = counts.matched;
    let false_negatives = counts.actual.saturating_sub(tp);
    let false_positives = counts.scanned.saturating_sub(counts.matched + counts.partial);

    let precision = ratio(tp, counts.scanned);
    let recall = ratio(tp, counts.actual);

    let adjusted_scan = counts.scanned.saturating_sub(counts.qa);
    let tp_with_partial = counts.matched + counts.partial;
    let precision_with_partial = ratio(tp_with_partial, adjusted_scan);
    let recall_with_partial = ratio(tp_with_partial, counts.actual);

    Self {
      tp,
      false_negatives,
      false_positives,
      precision,
      recall,
      f1: f1(precision, recall),
      precision_with_partial,
      recall_with_partial,
      f1_with_partial: f1(precision_with_partial, recall_with_partial),
    }
  }
}

/// One subject's full scoreboard entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectStats {
  pub subject: String,
  #[serde(flatten)]
  pub counts: SubjectCounts,
  #[serde(flatten)]
  pub metrics: ConfusionMetrics,
  /// Truth-side severity histogram over non-FP records.
  pub truth_severities: BTreeMap<String, usize>,
  /// Scanner-side severity histogram over all records.
  pub scan_severities: BTreeMap<String, usize>,
}

impl SubjectStats {
  pub fn new(subject: impl Into<String>, counts: SubjectCounts, records: &[EvaluationRecord]) -> Self {
    let mut truth_severities = BTreeMap::new();
    let mut scan_severities = BTreeMap::new();
    for record in records {
      if !record.is_fp {
        *truth_severities
          .entry(norm_sev_bucket(&record.severity_from_truth).to_string())
          .or_insert(0) += 1;
      }
      *scan_severities
        .entry(norm_sev_bucket(&record.severity_from_scanner).to_string())
        .or_insert(0) += 1;
    }

    Self {
      subject: subject.into(),
      counts,
      metrics: ConfusionMetrics::compute(&counts),
      truth_severities,
      scan_severities,
    }
  }
}

/// Sum counts across subjects, then recompute the ratios from the sums.
pub fn aggregate(all: &[SubjectStats]) -> (SubjectCounts, ConfusionMetrics) {
  let mut totals = SubjectCounts::default();
  for stats in all {
    totals.add(&stats.counts);
  }
  let metrics = ConfusionMetrics::compute(&totals);
  (totals, metrics)
}

/// Collapse free-form severity strings into report histogram buckets.
///
/// Deliberately looser than `Severity::parse`: report histograms absorb
/// whatever spelling the scan files carry.
pub fn norm_sev_bucket(raw: &str) -> &'static str {
  let lower = raw.trim().to_lowercase();
  if matches!(
    lower.as_str(),
    "best practices" | "best practice" | "best_practices" | "bp" | "bestpractices"
  ) {
    "bestpractices"
  } else if lower.starts_with("crit") || lower.contains("critical") || lower.contains("high") {
    "high"
  } else if lower.contains("medium") || lower.contains("mod") {
    "medium"
  } else if lower.contains("low") {
    "low"
  } else if lower.contains("info") || lower.contains("note") || lower.contains("hint") {
    "info"
  } else {
    "unknown"
  }
}
