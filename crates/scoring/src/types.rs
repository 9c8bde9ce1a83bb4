//! Core data model for the evaluation pipeline.
//!
//! Truth and candidate findings share one shape; candidates additionally
//! carry the immutable `Index` assigned at ingestion, which is the only
//! stable identity used by the bookkeeping downstream.

use serde::{Deserialize, Serialize};

/// Severity scale shared by truth and scanner findings.
///
/// Unrecognized values are carried through title-cased rather than
/// rejected, so a subject with odd scanner output still evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
  High,
  Medium,
  Low,
  Info,
  BestPractices,
  Other(String),
}

impl Severity {
  pub fn as_str(&self) -> &str {
    match self {
      Severity::High => "High",
      Severity::Medium => "Medium",
      Severity::Low => "Low",
      Severity::Info => "Info",
      Severity::BestPractices => "Best Practices",
      Severity::Other(s) => s,
    }
  }

  /// QA-class severities are excluded from substantive scanning metrics.
  pub fn is_qa(&self) -> bool {
    matches!(self, Severity::Info | Severity::BestPractices)
  }

  /// Normalize a raw severity string via the fixed mapping table.
  ///
  /// Case-insensitive; unrecognized values pass through title-cased.
  pub fn parse(raw: &str) -> Self {
    let v = raw.trim();
    match v.to_lowercase().as_str() {
      "critical" | "high" => Severity::High,
      "med" | "medium" | "moderate" => Severity::Medium,
      "low" => Severity::Low,
      "informational" | "info" => Severity::Info,
      "best practices" | "best_practices" => Severity::BestPractices,
      _ => Severity::Other(title_case(v)),
    }
  }
}

impl From<String> for Severity {
  fn from(raw: String) -> Self {
    Severity::parse(&raw)
  }
}

impl From<Severity> for String {
  fn from(sev: Severity) -> Self {
    sev.as_str().to_string()
  }
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

fn title_case(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut prev_alpha = false;
  for c in s.chars() {
    if c.is_alphabetic() {
      if prev_alpha {
        out.extend(c.to_lowercase());
      } else {
        out.extend(c.to_uppercase());
      }
      prev_alpha = true;
    } else {
      out.push(c);
      prev_alpha = false;
    }
  }
  out
}

/// Enumerated issue classification. Unknown strings fold to `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
  Reentrancy,
  AccessControl,
  IntegerOverflowUnderflow,
  DenialOfService,
  UncheckedCall,
  FrontRunning,
  ConfigDependent,
  BusinessLogic,
  PrecisionLoss,
  CentralizationRisk,
  #[default]
  Other,
}

impl Category {
  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Reentrancy => "Reentrancy",
      Category::AccessControl => "Access Control",
      Category::IntegerOverflowUnderflow => "Integer Overflow/Underflow",
      Category::DenialOfService => "Denial of Service",
      Category::UncheckedCall => "Unchecked Call",
      Category::FrontRunning => "Front-Running",
      Category::ConfigDependent => "Config Dependent",
      Category::BusinessLogic => "Business Logic",
      Category::PrecisionLoss => "Precision Loss",
      Category::CentralizationRisk => "Centralization Risk",
      Category::Other => "Other",
    }
  }
}

impl From<String> for Category {
  fn from(raw: String) -> Self {
    match raw.trim() {
      "Reentrancy" => Category::Reentrancy,
      "Access Control" => Category::AccessControl,
      "Integer Overflow/Underflow" => Category::IntegerOverflowUnderflow,
      "Denial of Service" => Category::DenialOfService,
      "Unchecked Call" => Category::UncheckedCall,
      "Front-Running" => Category::FrontRunning,
      "Config Dependent" => Category::ConfigDependent,
      "Business Logic" => Category::BusinessLogic,
      "Precision Loss" => Category::PrecisionLoss,
      "Centralization Risk" => Category::CentralizationRisk,
      _ => Category::Other,
    }
  }
}

impl From<Category> for String {
  fn from(cat: Category) -> Self {
    cat.as_str().to_string()
  }
}

impl std::fmt::Display for Category {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One ground-truth issue. Identity is its position in the truth sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthFinding {
  #[serde(rename = "Issue")]
  pub issue: String,
  #[serde(rename = "Category", default)]
  pub category: Category,
  #[serde(rename = "Severity")]
  pub severity: Severity,
  #[serde(rename = "Contracts", default)]
  pub contracts: Vec<String>,
  #[serde(rename = "Description")]
  pub description: String,
}

/// One scanner-produced finding under evaluation.
///
/// `index` is assigned once at ingestion (position in the original scanner
/// output) and never changes, even as the working set shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFinding {
  #[serde(rename = "Issue")]
  pub issue: String,
  #[serde(rename = "Category", default)]
  pub category: Category,
  #[serde(rename = "Severity")]
  pub severity: Severity,
  #[serde(rename = "Contracts", default)]
  pub contracts: Vec<String>,
  #[serde(rename = "Description")]
  pub description: String,
  #[serde(rename = "Index")]
  pub index: usize,
}

fn na() -> String {
  "N/A".to_string()
}

fn no_index() -> i64 {
  -1
}

/// Output of one Judge call for one (truth item, batch) pair.
///
/// `is_match` and `is_partial_match` are mutually exclusive; both false
/// means a no-match verdict, which is still a verdict (not an abstention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
  pub is_match: bool,
  pub is_partial_match: bool,
  pub explanation: String,
  #[serde(default = "na")]
  pub severity_from_scanner: String,
  #[serde(default = "na")]
  pub severity_from_truth: String,
  /// Batch-local position of the matched candidate, -1 if none.
  #[serde(default = "no_index")]
  pub matched_index: i64,
}

/// One evaluation outcome, either derived from a truth item's search or
/// synthesized for an unclaimed candidate (false positive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
  pub is_match: bool,
  pub is_partial_match: bool,
  pub is_fp: bool,
  pub explanation: String,
  pub severity_from_scanner: String,
  pub severity_from_truth: String,
  /// Original (global) candidate index, -1 if no candidate involved.
  pub candidate_index: i64,
  /// Snapshot of the candidate's description at evaluation time.
  pub candidate_description: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_severity_mapping_table() {
    assert_eq!(Severity::parse("critical"), Severity::High);
    assert_eq!(Severity::parse("HIGH"), Severity::High);
    assert_eq!(Severity::parse("med"), Severity::Medium);
    assert_eq!(Severity::parse("Moderate"), Severity::Medium);
    assert_eq!(Severity::parse("low"), Severity::Low);
    assert_eq!(Severity::parse("informational"), Severity::Info);
    assert_eq!(Severity::parse("best_practices"), Severity::BestPractices);
    assert_eq!(Severity::parse("Best Practices"), Severity::BestPractices);
  }

  #[test]
  fn test_severity_unrecognized_title_cased() {
    assert_eq!(
      Severity::parse("unknown level"),
      Severity::Other("Unknown Level".to_string())
    );
    assert_eq!(Severity::parse("N/A").as_str(), "N/A");
  }

  #[test]
  fn test_severity_qa_class() {
    assert!(Severity::Info.is_qa());
    assert!(Severity::BestPractices.is_qa());
    assert!(!Severity::High.is_qa());
    assert!(!Severity::Other("Note".to_string()).is_qa());
  }

  #[test]
  fn test_severity_serde_round_trip() {
    let json = serde_json::to_string(&Severity::BestPractices).unwrap();
    assert_eq!(json, "\"Best Practices\"");
    let back: Severity = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Severity::BestPractices);
  }

  #[test]
  fn test_category_unknown_folds_to_other() {
    assert_eq!(Category::from("Reentrancy".to_string()), Category::Reentrancy);
    assert_eq!(Category::from("made up".to_string()), Category::Other);
    assert_eq!(Category::default(), Category::Other);
  }

  #[test]
  fn test_truth_finding_defaults() {
    let truth: TruthFinding = serde_json::from_str(
      r#"{"Issue": "Reentrancy in withdraw", "Severity": "high", "Description": "..."}"#,
    )
    .unwrap();
    assert_eq!(truth.category, Category::Other);
    assert_eq!(truth.severity, Severity::High);
    assert!(truth.contracts.is_empty());
  }
}
