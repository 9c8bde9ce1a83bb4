//! Multi-call consensus over judge verdicts.
//!
//! One decision is made per (truth item, batch) pair by issuing up to
//! `iterations` judge calls and reducing whatever verdicts come back.
//! Two calls run concurrently; a third is only spent when the first two
//! disagree on the verdict class.

use tracing::debug;

use crate::judge::{Judge, JudgeOutcome};
use crate::types::{CandidateFinding, TruthFinding, Verdict};

/// Split a working set into contiguous batches of at most `batch_size`.
///
/// The final batch may be short. `batch_size` of zero is a caller bug and
/// is clamped to one rather than panicking in `chunks`.
pub fn partition<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
  items.chunks(batch_size.max(1)).collect()
}

/// The three-way class a verdict falls into for agreement purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerdictClass {
  Match,
  Partial,
  NoMatch,
}

fn classify(verdict: &Verdict) -> VerdictClass {
  if verdict.is_match {
    VerdictClass::Match
  } else if verdict.is_partial_match {
    VerdictClass::Partial
  } else {
    VerdictClass::NoMatch
  }
}

/// Reduce resolved verdicts to a single decision.
///
/// Unanimity takes the first verdict; a 2-of-3 majority takes the first
/// verdict of the majority class; a full three-way split resolves to the
/// first partial match. Anything else falls back to the first verdict.
/// Returns `None` when every call abstained.
pub fn reduce(verdicts: Vec<Verdict>) -> Option<Verdict> {
  if verdicts.is_empty() {
    return None;
  }

  let classes: Vec<VerdictClass> = verdicts.iter().map(classify).collect();
  let count = |class: VerdictClass| classes.iter().filter(|c| **c == class).count();
  let first_of = |class: VerdictClass| {
    classes
      .iter()
      .position(|c| *c == class)
      .map(|i| verdicts[i].clone())
      .unwrap_or_else(|| verdicts[0].clone())
  };

  let total = verdicts.len();
  let matches = count(VerdictClass::Match);
  let partials = count(VerdictClass::Partial);
  let no_matches = count(VerdictClass::NoMatch);

  let decision = if matches == total || partials == total || no_matches == total {
    verdicts[0].clone()
  } else if matches >= 2 {
    first_of(VerdictClass::Match)
  } else if partials >= 2 {
    first_of(VerdictClass::Partial)
  } else if no_matches >= 2 {
    first_of(VerdictClass::NoMatch)
  } else if matches == 1 && partials == 1 && no_matches == 1 {
    first_of(VerdictClass::Partial)
  } else {
    verdicts[0].clone()
  };

  Some(decision)
}

/// Runs the fork-join call pattern and reduction for one batch.
pub struct ConsensusEngine<'a> {
  judge: &'a dyn Judge,
  iterations: usize,
}

impl<'a> ConsensusEngine<'a> {
  pub fn new(judge: &'a dyn Judge, iterations: usize) -> Self {
    Self { judge, iterations }
  }

  /// Decide one (truth item, batch) pair. `None` means every issued call
  /// abstained and the batch contributes nothing.
  pub async fn decide(&self, truth: &TruthFinding, batch: &[CandidateFinding]) -> Option<Verdict> {
    if self.iterations <= 1 {
      return self.judge.judge(truth, batch).await.into_verdict();
    }

    let (first, second) = futures::future::join(self.judge.judge(truth, batch), self.judge.judge(truth, batch)).await;

    let mut verdicts: Vec<Verdict> = [first, second].into_iter().filter_map(JudgeOutcome::into_verdict).collect();

    let agreed = verdicts.len() == 2 && classify(&verdicts[0]) == classify(&verdicts[1]);
    if self.iterations >= 3 && !agreed {
      debug!(resolved = verdicts.len(), "Verdicts disagree, issuing tie-break call");
      if let Some(third) = self.judge.judge(truth, batch).await.into_verdict() {
        verdicts.push(third);
      }
    }

    reduce(verdicts)
  }
}
