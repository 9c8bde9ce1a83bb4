//! Judge adapter: one verdict per (truth item, batch) pair.
//!
//! The `Judge` trait is the seam between the scoring pipeline and the
//! oracle deciding matches. The shipped implementation rides on the `llm`
//! crate; failures of any kind become `Abstain`, never an error, so a
//! single bad call can never take down a run.

use std::path::PathBuf;

use async_trait::async_trait;
use llm::{InferenceRequest, LlmProvider};
use serde_json::json;
use tracing::{debug, warn};

use crate::types::{CandidateFinding, TruthFinding, Verdict};
use crate::{Result, ScoringError};

/// Outcome of one judge call.
///
/// Abstention is modeled explicitly so downstream code can never mistake
/// a failed call for a no-match verdict.
#[derive(Debug, Clone)]
pub enum JudgeOutcome {
  Verdict(Verdict),
  Abstain,
}

impl JudgeOutcome {
  pub fn into_verdict(self) -> Option<Verdict> {
    match self {
      JudgeOutcome::Verdict(v) => Some(v),
      JudgeOutcome::Abstain => None,
    }
  }
}

/// Oracle deciding whether a batch of candidates contains a truth item.
///
/// A verdict's `matched_index` refers to positions within `batch`. Calls
/// must be idempotent-safe: the consensus engine issues several calls
/// with identical input for one decision.
#[async_trait]
pub trait Judge: Send + Sync {
  async fn judge(&self, truth: &TruthFinding, batch: &[CandidateFinding]) -> JudgeOutcome;
}

/// JSON schema constraining the judge's structured output to a `Verdict`.
const VERDICT_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "is_match": { "type": "boolean" },
    "is_partial_match": { "type": "boolean" },
    "explanation": { "type": "string" },
    "severity_from_scanner": { "type": "string" },
    "severity_from_truth": { "type": "string" },
    "matched_index": { "type": "integer" }
  },
  "required": ["is_match", "is_partial_match", "explanation", "matched_index"]
}"#;

const JUDGE_SYSTEM_PROMPT: &str = "You are a security auditing expert evaluating the accuracy of an \
  automated scanner's report against a verified ground-truth issue. Respond only with the requested \
  JSON object.";

/// LLM-backed judge adapter.
pub struct LlmJudge {
  provider: Box<dyn LlmProvider>,
  model: String,
  timeout_secs: u64,
  /// When set, the rendered prompt is written here on every call.
  prompt_dump: Option<PathBuf>,
}

impl LlmJudge {
  /// Create a judge on the default provider.
  pub fn new(model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
    let provider = llm::create_provider().map_err(|e| ScoringError::Config(e.to_string()))?;
    Ok(Self::with_provider(provider, model, timeout_secs))
  }

  /// Create a judge on an explicit provider (used by tests).
  pub fn with_provider(provider: Box<dyn LlmProvider>, model: impl Into<String>, timeout_secs: u64) -> Self {
    Self {
      provider,
      model: model.into(),
      timeout_secs,
      prompt_dump: None,
    }
  }

  /// Write the rendered prompt to `path` on each call.
  pub fn with_prompt_dump(mut self, path: PathBuf) -> Self {
    self.prompt_dump = Some(path);
    self
  }

  fn render_prompt(truth: &TruthFinding, batch: &[CandidateFinding]) -> Result<String> {
    let batch_entries: Vec<serde_json::Value> = batch
      .iter()
      .enumerate()
      .map(|(local_index, c)| {
        json!({
          "Issue": c.issue,
          "Category": c.category.as_str(),
          "Description": c.description,
          "Contracts": c.contracts,
          "Severity": c.severity.as_str(),
          "Index": local_index,
        })
      })
      .collect();

    let truth_json = serde_json::to_string_pretty(truth)?;
    let batch_json = serde_json::to_string_pretty(&batch_entries)?;

    let template = r#"You are given a verified security issue (the ground truth) and a series of findings
produced by an automated scanner over the same source code. Decide whether the scanner
identified the verified issue.

A finding is a full match only if it identifies the affected component and function,
accurately describes the core issue (even if phrased differently), and accurately
describes its consequences.

A finding is a partial match only if it identifies the affected component and function
and describes the core issue, but only partially describes the consequences. A partial
match is not a full match, but it should let a competent reviewer locate the real issue
after investigating.

Do not count a finding that merely names the right function without explaining the issue,
or whose description is too vague to act on; treat the latter as a partial match at most.
If several findings qualify, pick the one closest to the ground-truth description.

Set "matched_index" to the 0-based "Index" of the matching or partially matching finding,
or -1 when nothing matches. Use "N/A" for any missing severity. Check every finding before
concluding.

## Verified issue:
```json
{truth}
```

## Scanner findings:
```json
{findings}
```"#;

    Ok(template.replace("{truth}", &truth_json).replace("{findings}", &batch_json))
  }
}

#[async_trait]
impl Judge for LlmJudge {
  async fn judge(&self, truth: &TruthFinding, batch: &[CandidateFinding]) -> JudgeOutcome {
    let prompt = match Self::render_prompt(truth, batch) {
      Ok(p) => p,
      Err(e) => {
        warn!(err = %e, "Failed to render judge prompt");
        return JudgeOutcome::Abstain;
      }
    };

    if let Some(path) = &self.prompt_dump {
      if let Err(e) = std::fs::write(path, &prompt) {
        warn!(err = %e, path = %path.display(), "Failed to write debug prompt");
      }
    }

    let request = InferenceRequest {
      prompt,
      system_prompt: Some(JUDGE_SYSTEM_PROMPT.to_string()),
      model: self.model.clone(),
      timeout_secs: self.timeout_secs,
      json_schema: VERDICT_SCHEMA.to_string(),
    };

    let response = match self.provider.infer(request).await {
      Ok(r) => r,
      Err(e) => {
        warn!(err = %e, model = %self.model, "Judge call failed, abstaining");
        return JudgeOutcome::Abstain;
      }
    };

    match serde_json::from_str::<Verdict>(&response.text) {
      Ok(verdict) => {
        debug!(
          is_match = verdict.is_match,
          is_partial_match = verdict.is_partial_match,
          matched_index = verdict.matched_index,
          "Judge verdict"
        );
        JudgeOutcome::Verdict(verdict)
      }
      Err(e) => {
        warn!(
          err = %e,
          response_preview = %response.text.chars().take(200).collect::<String>(),
          "Unparseable judge response, abstaining"
        );
        JudgeOutcome::Abstain
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Category, Severity};
  use llm::{InferenceResponse, LlmError};

  #[derive(Clone)]
  struct CannedProvider {
    text: &'static str,
    fail: bool,
  }

  #[async_trait]
  impl LlmProvider for CannedProvider {
    fn name(&self) -> &str {
      "canned"
    }

    fn is_available(&self) -> bool {
      true
    }

    async fn infer(&self, _request: InferenceRequest) -> llm::Result<InferenceResponse> {
      if self.fail {
        return Err(LlmError::NoResponse);
      }
      Ok(InferenceResponse {
        text: self.text.to_string(),
        input_tokens: 10,
        output_tokens: 10,
        cost_usd: None,
        duration_ms: 1,
      })
    }
  }

  fn truth() -> TruthFinding {
    TruthFinding {
      issue: "Reentrancy in withdraw".to_string(),
      category: Category::Reentrancy,
      severity: Severity::High,
      contracts: vec!["Vault".to_string()],
      description: "External call before state update".to_string(),
    }
  }

  fn candidate(index: usize) -> CandidateFinding {
    CandidateFinding {
      issue: format!("finding {index}"),
      category: Category::Other,
      severity: Severity::Medium,
      contracts: vec![],
      description: "something".to_string(),
      index,
    }
  }

  #[tokio::test]
  async fn test_parses_structured_verdict() {
    let provider = CannedProvider {
      text: r#"{"is_match": true, "is_partial_match": false, "explanation": "same issue",
                    "severity_from_scanner": "High", "severity_from_truth": "High", "matched_index": 1}"#,
      fail: false,
    };
    let judge = LlmJudge::with_provider(Box::new(provider), "haiku", 30);

    let outcome = judge.judge(&truth(), &[candidate(0), candidate(1)]).await;
    let verdict = outcome.into_verdict().unwrap();
    assert!(verdict.is_match);
    assert_eq!(verdict.matched_index, 1);
  }

  #[tokio::test]
  async fn test_missing_severities_default_to_na() {
    let provider = CannedProvider {
      text: r#"{"is_match": false, "is_partial_match": false, "explanation": "no overlap", "matched_index": -1}"#,
      fail: false,
    };
    let judge = LlmJudge::with_provider(Box::new(provider), "haiku", 30);

    let verdict = judge.judge(&truth(), &[candidate(0)]).await.into_verdict().unwrap();
    assert_eq!(verdict.severity_from_scanner, "N/A");
    assert_eq!(verdict.severity_from_truth, "N/A");
  }

  #[tokio::test]
  async fn test_call_failure_becomes_abstention() {
    let provider = CannedProvider { text: "", fail: true };
    let judge = LlmJudge::with_provider(Box::new(provider), "haiku", 30);

    assert!(matches!(judge.judge(&truth(), &[candidate(0)]).await, JudgeOutcome::Abstain));
  }

  #[tokio::test]
  async fn test_unparseable_response_becomes_abstention() {
    let provider = CannedProvider {
      text: "I could not decide.",
      fail: false,
    };
    let judge = LlmJudge::with_provider(Box::new(provider), "haiku", 30);

    assert!(matches!(judge.judge(&truth(), &[candidate(0)]).await, JudgeOutcome::Abstain));
  }

  #[test]
  fn test_prompt_carries_local_indices() {
    let prompt = LlmJudge::render_prompt(&truth(), &[candidate(7), candidate(9)]).unwrap();
    // batch entries are numbered by local position, not original index
    assert!(prompt.contains("\"Index\": 0"));
    assert!(prompt.contains("\"Index\": 1"));
    assert!(prompt.contains("Reentrancy in withdraw"));
  }
}
