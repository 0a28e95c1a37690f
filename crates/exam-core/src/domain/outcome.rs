//! Outcome - host 層が target ごとに受け取る結果
//!
//! target address ごとに `Finished` がちょうど 1 つ。invoke まで進めなかった
//! run では、宣言済み operation ごとに `Aborted` がちょうど 1 つ。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ErrorKind, ExamError};
use super::ids::{AddressId, RunId};

/// Serialized as SUCCESS / FAILURE / ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,

    /// The test body itself failed.
    Failure,

    /// Infrastructure failure scoped to this target.
    Error,
}

impl OutcomeKind {
    pub fn of(result: &Result<(), ExamError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) if err.kind() == ErrorKind::TestFailure => Self::Failure,
            Err(_) => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub address: AddressId,

    /// Display name: `<operation>:<address caption>`.
    pub target: String,

    pub unit: String,
    pub operation: String,
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// One entry in the per-address result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run: RunId,
        target: String,
    },
    Finished(TestOutcome),
    Aborted {
        run: RunId,
        unit: String,
        operation: String,
        reason: String,
    },
}

/// Aggregate of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub outcomes: Vec<TestOutcome>,
}

impl RunReport {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoxError;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        assert_eq!(serde_json::to_string(&OutcomeKind::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(serde_json::to_string(&OutcomeKind::Failure).unwrap(), "\"FAILURE\"");
        assert_eq!(serde_json::to_string(&OutcomeKind::Error).unwrap(), "\"ERROR\"");
    }

    #[test]
    fn test_failures_and_infrastructure_errors_are_told_apart() {
        let failure: BoxError = "expected 2, got 3".into();
        assert_eq!(
            OutcomeKind::of(&Err(ExamError::test_failure(failure))),
            OutcomeKind::Failure
        );
        assert_eq!(
            OutcomeKind::of(&Err(ExamError::container_msg("gone"))),
            OutcomeKind::Error
        );
        assert_eq!(OutcomeKind::of(&Ok(())), OutcomeKind::Success);
    }

    #[test]
    fn run_event_is_tagged() {
        let event = RunEvent::Aborted {
            run: RunId::generate(),
            unit: "Calc".to_string(),
            operation: "adds".to_string(),
            reason: "no configuration declared".to_string(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "aborted");
        assert_eq!(v["operation"], "adds");
    }
}
