//! Input loading and normalization.
//!
//! Truth and scan files arrive in two shapes: a flat array of finding
//! objects, or an object wrapping the list (`vulnerabilities` for truth,
//! `findings` for some scanners). Shape detection is explicit; each shape
//! has a named normalizer. Anything else is an `UnsupportedShape` error.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{CandidateFinding, Category, EvaluationRecord, Severity, TruthFinding};
use crate::{Result, ScoringError};

pub fn truth_path(subject: &str, data_root: &Path) -> PathBuf {
  data_root.join("source_of_truth").join(format!("{subject}.json"))
}

pub fn scan_path(subject: &str, data_root: &Path, scan_source: &str) -> PathBuf {
  data_root.join(scan_source).join(format!("{subject}_results.json"))
}

pub fn evaluation_path(subject: &str, output_root: &Path) -> PathBuf {
  output_root.join(format!("{subject}_results.json"))
}

/// Ordered keyword rules mapping a scanner's free-form vulnerability type
/// to a category. Each rule lists alternatives; an alternative is a set of
/// substrings that must all be present. First matching rule wins.
///
/// Rule order is significant. "config" must stay ahead of "logic", and
/// "precision" ahead of the business-logic catch-all; reordering changes
/// classifications.
const CATEGORY_RULES: &[(&[&[&str]], Category)] = &[
  (&[&["reentrancy"]], Category::Reentrancy),
  (&[&["access control"], &["authentication"]], Category::AccessControl),
  (
    &[&["overflow"], &["underflow"], &["integer"]],
    Category::IntegerOverflowUnderflow,
  ),
  (
    &[&["denial of service"], &["denial-of-service"], &["dos"]],
    Category::DenialOfService,
  ),
  (&[&["unchecked", "call"]], Category::UncheckedCall),
  (&[&["front", "run"]], Category::FrontRunning),
  (&[&["config"]], Category::ConfigDependent),
  (&[&["precision"], &["round"]], Category::PrecisionLoss),
  (&[&["centralization"]], Category::CentralizationRisk),
  (
    &[
      &["logic"],
      &["validation"],
      &["business"],
      &["state corruption"],
      &["storage collision"],
    ],
    Category::BusinessLogic,
  ),
];

/// Infer a category from a scanner's vulnerability-type string.
pub fn infer_category(raw: &str) -> Option<Category> {
  let value = raw.trim().to_lowercase();
  CATEGORY_RULES
    .iter()
    .find(|(alternatives, _)| {
      alternatives
        .iter()
        .any(|needles| needles.iter().all(|n| value.contains(n)))
    })
    .map(|(_, category)| *category)
}

/// The recognized top-level input structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputShape {
  /// Plain JSON array of finding objects.
  FlatList,
  /// `{ "vulnerabilities": [...] }`, the source-of-truth export shape.
  WrappedVulnerabilities,
  /// `{ "findings": [...] }`, used by some scanner exports.
  WrappedFindings,
}

fn detect_shape(value: &Value) -> Option<InputShape> {
  match value {
    Value::Array(_) => Some(InputShape::FlatList),
    Value::Object(map) => {
      if map.get("vulnerabilities").is_some_and(Value::is_array) {
        Some(InputShape::WrappedVulnerabilities)
      } else if map.get("findings").is_some_and(Value::is_array) {
        Some(InputShape::WrappedFindings)
      } else {
        None
      }
    }
    _ => None,
  }
}

/// One finding in any of the field spellings seen in the wild.
#[derive(Debug, Deserialize)]
struct RawItem {
  #[serde(alias = "Issue", alias = "title", alias = "Title")]
  issue: Option<String>,
  #[serde(alias = "Category")]
  category: Option<String>,
  #[serde(alias = "Severity")]
  severity: Option<String>,
  #[serde(alias = "Description")]
  description: Option<String>,
  #[serde(alias = "Contracts")]
  contracts: Option<Value>,
  file: Option<String>,
  vulnerability_type: Option<String>,
}

impl RawItem {
  fn contract_list(&self) -> Vec<String> {
    match &self.contracts {
      Some(Value::Array(items)) => items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect(),
      Some(Value::String(s)) => vec![s.clone()],
      _ => self.file.clone().map(|f| vec![f]).unwrap_or_default(),
    }
  }

  fn severity(&self) -> Severity {
    Severity::parse(self.severity.as_deref().unwrap_or(""))
  }

  /// Exact category names pass through; anything else (including absent)
  /// is inferred from the vulnerability type or defaults to Other.
  fn category(&self) -> Category {
    let exact = self
      .category
      .as_deref()
      .map(|c| Category::from(c.to_string()))
      .filter(|c| *c != Category::Other);
    exact
      .or_else(|| self.vulnerability_type.as_deref().and_then(infer_category))
      .unwrap_or_default()
  }
}

fn parse_items(value: Value, shape: InputShape) -> Result<Vec<RawItem>> {
  let list = match (shape, value) {
    (InputShape::FlatList, Value::Array(items)) => items,
    (InputShape::WrappedVulnerabilities, Value::Object(mut map)) => match map.remove("vulnerabilities") {
      Some(Value::Array(items)) => items,
      _ => vec![],
    },
    (InputShape::WrappedFindings, Value::Object(mut map)) => match map.remove("findings") {
      Some(Value::Array(items)) => items,
      _ => vec![],
    },
    _ => vec![],
  };

  list
    .into_iter()
    .map(|item| serde_json::from_value::<RawItem>(item).map_err(ScoringError::from))
    .collect()
}

fn read_value(path: &Path) -> Result<Value> {
  if !path.exists() {
    return Err(ScoringError::MissingInput(path.to_path_buf()));
  }
  let text = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&text)?)
}

/// Load the ordered ground-truth findings for one subject.
pub fn load_truth(subject: &str, data_root: &Path) -> Result<Vec<TruthFinding>> {
  let path = truth_path(subject, data_root);
  let value = read_value(&path)?;
  let shape = detect_shape(&value).ok_or_else(|| ScoringError::UnsupportedShape(path.clone()))?;
  let items = parse_items(value, shape)?;
  debug!(subject, count = items.len(), ?shape, "Loaded truth findings");

  Ok(
    items
      .into_iter()
      .map(|item| TruthFinding {
        issue: item.issue.clone().unwrap_or_default(),
        category: item.category(),
        severity: item.severity(),
        contracts: item.contract_list(),
        description: item.description.clone().unwrap_or_default(),
      })
      .collect(),
  )
}

/// Load the ordered scanner findings for one subject. Each candidate gets
/// a stable index from its position in the file.
pub fn load_candidates(subject: &str, data_root: &Path, scan_source: &str) -> Result<Vec<CandidateFinding>> {
  let path = scan_path(subject, data_root, scan_source);
  let value = read_value(&path)?;
  let shape = detect_shape(&value).ok_or_else(|| ScoringError::UnsupportedShape(path.clone()))?;
  let items = parse_items(value, shape)?;
  debug!(subject, count = items.len(), ?shape, "Loaded scan findings");

  Ok(
    items
      .into_iter()
      .enumerate()
      .map(|(index, item)| CandidateFinding {
        issue: item.issue.clone().unwrap_or_default(),
        category: item.category(),
        severity: item.severity(),
        contracts: item.contract_list(),
        description: item.description.clone().unwrap_or_default(),
        index,
      })
      .collect(),
  )
}

/// Write a subject's evaluation records as an ordered JSON array.
pub fn store_evaluation(records: &[EvaluationRecord], subject: &str, output_root: &Path) -> Result<()> {
  let path = evaluation_path(subject, output_root);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let payload = serde_json::to_string_pretty(records)?;
  std::fs::write(path, payload)?;
  Ok(())
}

pub fn load_evaluation(path: &Path) -> Result<Vec<EvaluationRecord>> {
  let text = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn write_file(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
  }

  #[test]
  fn test_load_flat_truth() {
    let tmp = TempDir::new().unwrap();
    write_file(
      tmp.path(),
      "source_of_truth/vault.json",
      r#"[{"Issue": "Reentrancy in withdraw", "Category": "Reentrancy", "Severity": "critical",
             "Contracts": ["Vault.sol"], "Description": "call before state update"}]"#,
    );

    let truths = load_truth("vault", tmp.path()).unwrap();
    assert_eq!(truths.len(), 1);
    assert_eq!(truths[0].issue, "Reentrancy in withdraw");
    assert_eq!(truths[0].category, Category::Reentrancy);
    assert_eq!(truths[0].severity, Severity::High);
  }

  #[test]
  fn test_load_wrapped_truth() {
    let tmp = TempDir::new().unwrap();
    write_file(
      tmp.path(),
      "source_of_truth/vault.json",
      r#"{"project_id": "vault", "vulnerabilities": [
             {"title": "Missing auth", "category": "Access Control", "severity": "High",
              "description": "anyone can call", "file": "Vault.sol"}]}"#,
    );

    let truths = load_truth("vault", tmp.path()).unwrap();
    assert_eq!(truths.len(), 1);
    assert_eq!(truths[0].issue, "Missing auth");
    assert_eq!(truths[0].category, Category::AccessControl);
    assert_eq!(truths[0].contracts, vec!["Vault.sol".to_string()]);
  }

  #[test]
  fn test_load_wrapped_scan_infers_category() {
    let tmp = TempDir::new().unwrap();
    write_file(
      tmp.path(),
      "scanner/vault_results.json",
      r#"{"project": "vault", "findings": [
             {"title": "Unsafe call", "severity": "medium", "description": "d",
              "file": "Vault.sol", "vulnerability_type": "unchecked external call"}]}"#,
    );

    let candidates = load_candidates("vault", tmp.path(), "scanner").unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].category, Category::UncheckedCall);
    assert_eq!(candidates[0].severity, Severity::Medium);
    assert_eq!(candidates[0].index, 0);
  }

  #[test]
  fn test_candidate_indices_follow_file_order() {
    let tmp = TempDir::new().unwrap();
    write_file(
      tmp.path(),
      "scanner/vault_results.json",
      r#"[{"Issue": "a", "Severity": "High", "Description": "a"},
            {"Issue": "b", "Severity": "Low", "Description": "b"}]"#,
    );

    let candidates = load_candidates("vault", tmp.path(), "scanner").unwrap();
    let indices: Vec<usize> = candidates.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1]);
  }

  #[test]
  fn test_missing_input_error() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(
      load_truth("nope", tmp.path()),
      Err(ScoringError::MissingInput(_))
    ));
  }

  #[test]
  fn test_unsupported_shape_error() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "source_of_truth/vault.json", r#"{"weird": true}"#);
    assert!(matches!(
      load_truth("vault", tmp.path()),
      Err(ScoringError::UnsupportedShape(_))
    ));
  }

  #[test]
  fn test_category_rule_precedence() {
    // "config" outranks the business-logic catch-all even when both hit
    assert_eq!(infer_category("configuration logic flaw"), Some(Category::ConfigDependent));
    // "precision" outranks "logic" too
    assert_eq!(infer_category("precision logic error"), Some(Category::PrecisionLoss));
    // access-control alternatives
    assert_eq!(infer_category("broken authentication"), Some(Category::AccessControl));
    // conjunctions need every word
    assert_eq!(infer_category("unchecked arithmetic"), None);
    assert_eq!(infer_category("unchecked external call"), Some(Category::UncheckedCall));
    assert_eq!(infer_category("harmless"), None);
  }

  #[test]
  fn test_store_and_load_evaluation_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let records = vec![EvaluationRecord {
      is_match: true,
      is_partial_match: false,
      is_fp: false,
      explanation: "same issue".to_string(),
      severity_from_scanner: "High".to_string(),
      severity_from_truth: "High".to_string(),
      candidate_index: 3,
      candidate_description: "desc".to_string(),
    }];

    store_evaluation(&records, "vault", tmp.path()).unwrap();
    let path = evaluation_path("vault", tmp.path());
    let loaded = load_evaluation(&path).unwrap();
    assert_eq!(loaded, records);
  }
}
