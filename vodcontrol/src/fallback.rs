//! Source fallback.
//!
//! A sweep walks the ordered candidate list once. Each failing source is
//! recorded; the next candidate is the first one not yet attempted. The
//! candidate order is never changed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::errors::FailureKind;
use crate::model::SourceCandidate;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FallbackAttempt {
    pub failed_source_id: String,
    pub failure_kind: FailureKind,
    pub timestamp_of_failure: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackDecision {
    Switch(SourceCandidate),
    /// Every candidate failed; carries the kind of the last failure.
    Exhausted(FailureKind),
}

#[derive(Clone, Debug, Default)]
pub struct FallbackResolver {
    candidates: Vec<SourceCandidate>,
    attempts: Vec<FallbackAttempt>,
}

impl FallbackResolver {
    pub fn new(candidates: Vec<SourceCandidate>) -> Self {
        Self {
            candidates,
            attempts: Vec::new(),
        }
    }

    /// Replaces the candidate list and starts a new sweep.
    pub fn set_candidates(&mut self, candidates: Vec<SourceCandidate>) {
        self.candidates = candidates;
        self.attempts.clear();
    }

    pub fn candidates(&self) -> &[SourceCandidate] {
        &self.candidates
    }

    pub fn candidate(&self, source_id: &str) -> Option<&SourceCandidate> {
        self.candidates.iter().find(|c| c.source_id == source_id)
    }

    pub fn attempts(&self) -> &[FallbackAttempt] {
        &self.attempts
    }

    pub fn reset_sweep(&mut self) {
        self.attempts.clear();
    }

    pub fn is_attempted(&self, source_id: &str) -> bool {
        self.attempts.iter().any(|a| a.failed_source_id == source_id)
    }

    pub fn record_failure(&mut self, source_id: &str, kind: FailureKind, at: DateTime<Utc>) {
        if self.is_attempted(source_id) {
            return;
        }
        self.attempts.push(FallbackAttempt {
            failed_source_id: source_id.to_string(),
            failure_kind: kind,
            timestamp_of_failure: at,
        });
    }

    pub fn next_candidate(&self) -> Option<&SourceCandidate> {
        self.candidates
            .iter()
            .find(|c| !self.is_attempted(&c.source_id))
    }

    /// Records the failure of `failed_source_id` and picks what to do next.
    pub fn advance(
        &mut self,
        failed_source_id: &str,
        kind: FailureKind,
        at: DateTime<Utc>,
    ) -> FallbackDecision {
        self.record_failure(failed_source_id, kind, at);
        match self.next_candidate() {
            Some(candidate) => {
                debug!(
                    failed = failed_source_id,
                    next = %candidate.source_id,
                    kind = %kind,
                    "Falling back to next source"
                );
                FallbackDecision::Switch(candidate.clone())
            }
            None => {
                debug!(
                    failed = failed_source_id,
                    attempts = self.attempts.len(),
                    kind = %kind,
                    "Fallback sweep exhausted"
                );
                FallbackDecision::Exhausted(kind)
            }
        }
    }
}
