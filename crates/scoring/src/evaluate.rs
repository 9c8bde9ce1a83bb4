//! Evaluation pipeline: batch search, record building, partial dedup and
//! false-positive collection.
//!
//! Truth items are processed strictly sequentially. Every full match
//! removes its candidate from the working set, which shifts the batch
//! boundaries and index bases every later truth item sees.

use std::collections::HashSet;

use indicatif::ProgressBar;
use tracing::debug;

use crate::consensus::{ConsensusEngine, partition};
use crate::judge::Judge;
use crate::types::{CandidateFinding, EvaluationRecord, TruthFinding, Verdict};

const NOT_FOUND_DESCRIPTION: &str = "NOT FOUND";
const FALSE_POSITIVE_EXPLANATION: &str = "The source of truth report does not contain this issue.";
const DEDUP_TP_NOTE: &str = " (Already counted as TP elsewhere, so not counted as partial here.)";
const DEDUP_PARTIAL_NOTE: &str = " (Already counted as partial elsewhere, so not counted here.)";

#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
  pub iterations: usize,
  pub batch_size: usize,
}

pub struct Evaluator<'a> {
  judge: &'a dyn Judge,
  options: EvalOptions,
  progress: Option<ProgressBar>,
}

impl<'a> Evaluator<'a> {
  pub fn new(judge: &'a dyn Judge, options: EvalOptions) -> Self {
    Self {
      judge,
      options,
      progress: None,
    }
  }

  pub fn with_progress(mut self, progress: ProgressBar) -> Self {
    self.progress = Some(progress);
    self
  }

  /// Search the working set batch by batch for one truth item.
  ///
  /// A full match short-circuits immediately. Otherwise the best verdict
  /// seen so far is kept, preferring partial matches over no-matches.
  /// Indices in the returned verdict are global over the working set.
  async fn search_batches(&self, truth: &TruthFinding, working: &[CandidateFinding]) -> Option<Verdict> {
    let engine = ConsensusEngine::new(self.judge, self.options.iterations);
    let mut current_best: Option<Verdict> = None;

    for (batch_number, batch) in partition(working, self.options.batch_size).into_iter().enumerate() {
      let Some(mut verdict) = engine.decide(truth, batch).await else {
        continue;
      };

      if verdict.matched_index >= 0 {
        verdict.matched_index += (batch_number * self.options.batch_size) as i64;
      }

      if verdict.is_match {
        debug!(batch_number, matched_index = verdict.matched_index, "Full match found");
        return Some(verdict);
      }

      match &current_best {
        None => current_best = Some(verdict),
        Some(best) if verdict.is_partial_match && !best.is_partial_match => current_best = Some(verdict),
        Some(_) => {}
      }
    }

    current_best
  }

  /// Run every truth item against a shrinking working set of candidates.
  ///
  /// Each full match removes its candidate before the next truth item is
  /// processed. Truth items the judge never resolved emit no record.
  pub async fn orchestrate(&self, truths: &[TruthFinding], candidates: &[CandidateFinding]) -> Vec<EvaluationRecord> {
    let mut working: Vec<CandidateFinding> = candidates.to_vec();
    let mut records = Vec::with_capacity(truths.len());

    for truth in truths {
      if let Some(mut verdict) = self.search_batches(truth, &working).await {
        verdict.severity_from_truth = truth.severity.as_str().to_string();

        let working_index = usize::try_from(verdict.matched_index)
          .ok()
          .filter(|i| *i < working.len());

        let (candidate_index, candidate_description) = match working_index {
          Some(i) => (working[i].index as i64, working[i].description.clone()),
          None => (-1, NOT_FOUND_DESCRIPTION.to_string()),
        };

        let record = EvaluationRecord {
          is_match: verdict.is_match,
          is_partial_match: verdict.is_partial_match,
          is_fp: false,
          explanation: verdict.explanation,
          severity_from_scanner: verdict.severity_from_scanner,
          severity_from_truth: verdict.severity_from_truth,
          candidate_index,
          candidate_description,
        };

        if record.is_match {
          if let Some(i) = working_index {
            working.remove(i);
          }
        }

        records.push(record);
      }

      if let Some(progress) = &self.progress {
        progress.inc(1);
      }
    }

    records
  }

  /// Full pipeline: orchestrate, deduplicate partials, collect FPs.
  pub async fn evaluate(&self, truths: &[TruthFinding], candidates: &[CandidateFinding]) -> Vec<EvaluationRecord> {
    let mut records = self.orchestrate(truths, candidates).await;
    dedup_partial_matches(&mut records);
    let false_positives = collect_false_positives(&records, candidates);
    records.extend(false_positives);
    records
  }
}

/// Demote partial-match records whose candidate was already claimed.
///
/// A candidate counted as a true positive must not also count as a
/// partial, and a candidate may back at most one partial. Demoted records
/// keep their explanation with a note appended. Idempotent.
pub fn dedup_partial_matches(records: &mut [EvaluationRecord]) {
  let matched_indices: HashSet<i64> = records
    .iter()
    .filter(|r| r.is_match && r.candidate_index >= 0)
    .map(|r| r.candidate_index)
    .collect();

  let mut claimed_partial_indices: HashSet<i64> = HashSet::new();

  for record in records.iter_mut() {
    if record.is_match || record.candidate_index < 0 || !record.is_partial_match {
      continue;
    }
    if matched_indices.contains(&record.candidate_index) {
      record.is_partial_match = false;
      record.explanation.push_str(DEDUP_TP_NOTE);
    } else if claimed_partial_indices.contains(&record.candidate_index) {
      record.is_partial_match = false;
      record.explanation.push_str(DEDUP_PARTIAL_NOTE);
    } else {
      claimed_partial_indices.insert(record.candidate_index);
    }
  }
}

/// Synthesize false-positive records for every candidate not claimed by a
/// full match or a retained partial, excluding informational severities.
pub fn collect_false_positives(records: &[EvaluationRecord], candidates: &[CandidateFinding]) -> Vec<EvaluationRecord> {
  let claimed: HashSet<i64> = records
    .iter()
    .filter(|r| (r.is_match || r.is_partial_match) && r.candidate_index >= 0)
    .map(|r| r.candidate_index)
    .collect();

  candidates
    .iter()
    .filter(|c| !claimed.contains(&(c.index as i64)) && !c.severity.is_qa())
    .map(|c| EvaluationRecord {
      is_match: false,
      is_partial_match: false,
      is_fp: true,
      explanation: FALSE_POSITIVE_EXPLANATION.to_string(),
      severity_from_scanner: c.severity.as_str().to_string(),
      severity_from_truth: "N/A".to_string(),
      candidate_index: c.index as i64,
      candidate_description: c.description.clone(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::judge::JudgeOutcome;
  use crate::types::{Category, Severity};
  use async_trait::async_trait;

  fn truth(issue: &str, severity: Severity) -> TruthFinding {
    TruthFinding {
      issue: issue.to_string(),
      category: Category::Other,
      severity,
      contracts: vec![],
      description: format!("{issue} description"),
    }
  }

  fn candidate(index: usize, severity: Severity) -> CandidateFinding {
    CandidateFinding {
      issue: format!("finding {index}"),
      category: Category::Other,
      severity,
      contracts: vec![],
      description: format!("candidate {index}"),
      index,
    }
  }

  fn verdict(is_match: bool, is_partial: bool, matched_index: i64) -> Verdict {
    Verdict {
      is_match,
      is_partial_match: is_partial,
      explanation: "because".to_string(),
      severity_from_scanner: "High".to_string(),
      severity_from_truth: "Low".to_string(),
      matched_index,
    }
  }

  /// Matches whichever candidate's description equals the truth issue,
  /// reporting its batch-local index. Abstains otherwise.
  struct DescriptionJudge;

  #[async_trait]
  impl Judge for DescriptionJudge {
    async fn judge(&self, truth: &TruthFinding, batch: &[CandidateFinding]) -> JudgeOutcome {
      match batch.iter().position(|c| c.description == truth.issue) {
        Some(local) => JudgeOutcome::Verdict(verdict(true, false, local as i64)),
        None => JudgeOutcome::Verdict(verdict(false, false, -1)),
      }
    }
  }

  struct AbstainingJudge;

  #[async_trait]
  impl Judge for AbstainingJudge {
    async fn judge(&self, _truth: &TruthFinding, _batch: &[CandidateFinding]) -> JudgeOutcome {
      JudgeOutcome::Abstain
    }
  }

  /// Always claims a full match at local index 0.
  struct FirstItemJudge;

  #[async_trait]
  impl Judge for FirstItemJudge {
    async fn judge(&self, _truth: &TruthFinding, batch: &[CandidateFinding]) -> JudgeOutcome {
      if batch.is_empty() {
        JudgeOutcome::Abstain
      } else {
        JudgeOutcome::Verdict(verdict(true, false, 0))
      }
    }
  }

  fn options(batch_size: usize) -> EvalOptions {
    EvalOptions {
      iterations: 1,
      batch_size,
    }
  }

  #[tokio::test]
  async fn test_match_in_later_batch_gets_global_index() {
    // candidate 3 sits in the second batch at local index 1
    let truths = vec![truth("candidate 3", Severity::High)];
    let candidates: Vec<_> = (0..5).map(|i| candidate(i, Severity::Medium)).collect();

    let judge = DescriptionJudge;
    let evaluator = Evaluator::new(&judge, options(2));
    let records = evaluator.orchestrate(&truths, &candidates).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].is_match);
    assert_eq!(records[0].candidate_index, 3);
    assert_eq!(records[0].candidate_description, "candidate 3");
  }

  #[tokio::test]
  async fn test_truth_severity_overrides_judge_severity() {
    let truths = vec![truth("candidate 0", Severity::High)];
    let candidates = vec![candidate(0, Severity::Medium)];

    let judge = DescriptionJudge;
    let records = Evaluator::new(&judge, options(10)).orchestrate(&truths, &candidates).await;

    // DescriptionJudge reports "Low" from the truth side; ground truth wins
    assert_eq!(records[0].severity_from_truth, "High");
  }

  #[tokio::test]
  async fn test_full_match_shrinks_working_set_for_later_truths() {
    // both truths resolve to the first item of the working set; after the
    // first match removes candidate 0, the second match lands on candidate 1
    let truths = vec![truth("a", Severity::High), truth("b", Severity::High)];
    let candidates = vec![candidate(0, Severity::High), candidate(1, Severity::High)];

    let judge = FirstItemJudge;
    let records = Evaluator::new(&judge, options(10)).orchestrate(&truths, &candidates).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].candidate_index, 0);
    assert_eq!(records[1].candidate_index, 1);
  }

  #[tokio::test]
  async fn test_no_double_full_match_on_same_candidate() {
    // only one candidate; the second truth finds an empty working set
    let truths = vec![truth("a", Severity::High), truth("b", Severity::High)];
    let candidates = vec![candidate(0, Severity::High)];

    let judge = FirstItemJudge;
    let records = Evaluator::new(&judge, options(10)).orchestrate(&truths, &candidates).await;

    let full_match_indices: Vec<i64> = records
      .iter()
      .filter(|r| r.is_match)
      .map(|r| r.candidate_index)
      .collect();
    assert_eq!(full_match_indices, vec![0]);
  }

  #[tokio::test]
  async fn test_abstaining_judge_emits_no_records_and_all_fps() {
    let truths = vec![truth("a", Severity::High)];
    let candidates = vec![candidate(0, Severity::High), candidate(1, Severity::Info)];

    let judge = AbstainingJudge;
    let records = Evaluator::new(&judge, options(10)).evaluate(&truths, &candidates).await;

    // one FP for the High candidate, nothing for the Info one
    assert_eq!(records.len(), 1);
    assert!(records[0].is_fp);
    assert_eq!(records[0].candidate_index, 0);
    assert_eq!(records[0].severity_from_truth, "N/A");
  }

  #[tokio::test]
  async fn test_unclaimed_candidate_becomes_false_positive() {
    let truths = vec![truth("candidate 0", Severity::High)];
    let candidates = vec![candidate(0, Severity::High), candidate(1, Severity::Medium)];

    let judge = DescriptionJudge;
    let records = Evaluator::new(&judge, options(10)).evaluate(&truths, &candidates).await;

    assert_eq!(records.len(), 2);
    assert!(records[0].is_match);
    assert!(records[1].is_fp);
    assert_eq!(records[1].candidate_index, 1);
    assert_eq!(records[1].explanation, FALSE_POSITIVE_EXPLANATION);
  }

  fn partial_record(candidate_index: i64) -> EvaluationRecord {
    EvaluationRecord {
      is_match: false,
      is_partial_match: true,
      is_fp: false,
      explanation: "overlaps".to_string(),
      severity_from_scanner: "High".to_string(),
      severity_from_truth: "High".to_string(),
      candidate_index,
      candidate_description: "desc".to_string(),
    }
  }

  fn match_record(candidate_index: i64) -> EvaluationRecord {
    EvaluationRecord {
      is_match: true,
      ..partial_record(candidate_index)
    }
  }

  #[test]
  fn test_dedup_demotes_partial_on_matched_candidate() {
    let mut records = vec![match_record(2), partial_record(2)];
    dedup_partial_matches(&mut records);

    assert!(!records[1].is_partial_match);
    assert!(records[1].explanation.ends_with(DEDUP_TP_NOTE));
    assert!(records[0].is_match);
  }

  #[test]
  fn test_dedup_keeps_first_partial_demotes_later_duplicates() {
    let mut records = vec![partial_record(5), partial_record(5)];
    dedup_partial_matches(&mut records);

    assert!(records[0].is_partial_match);
    assert!(!records[1].is_partial_match);
    assert!(records[1].explanation.ends_with(DEDUP_PARTIAL_NOTE));
  }

  #[test]
  fn test_dedup_is_idempotent() {
    let mut records = vec![match_record(1), partial_record(1), partial_record(3), partial_record(3)];
    dedup_partial_matches(&mut records);
    let after_first = records.clone();
    dedup_partial_matches(&mut records);

    assert_eq!(records, after_first);
  }

  #[test]
  fn test_dedup_ignores_unindexed_records() {
    let mut records = vec![partial_record(-1), partial_record(-1)];
    dedup_partial_matches(&mut records);

    assert!(records[0].is_partial_match);
    assert!(records[1].is_partial_match);
  }

  #[test]
  fn test_every_candidate_accounted_exactly_once() {
    // candidate 0 matched, 1 retained partial, 2 FP, 3 informational
    let mut records = vec![match_record(0), partial_record(1)];
    let candidates = vec![
      candidate(0, Severity::High),
      candidate(1, Severity::High),
      candidate(2, Severity::Medium),
      candidate(3, Severity::Info),
    ];

    dedup_partial_matches(&mut records);
    let fps = collect_false_positives(&records, &candidates);

    assert_eq!(fps.len(), 1);
    assert_eq!(fps[0].candidate_index, 2);
  }

  #[test]
  fn test_demoted_partial_keeps_candidate_claimed() {
    let mut records = vec![match_record(1), partial_record(1)];
    let candidates = vec![candidate(1, Severity::High)];

    dedup_partial_matches(&mut records);
    let fps = collect_false_positives(&records, &candidates);

    // candidate 1 is still claimed by the full match
    assert!(fps.is_empty());

    let mut records = vec![partial_record(0), partial_record(0)];
    let candidates = vec![candidate(0, Severity::High)];
    dedup_partial_matches(&mut records);
    let fps = collect_false_positives(&records, &candidates);
    // first partial retains the claim
    assert!(fps.is_empty());
  }
}
