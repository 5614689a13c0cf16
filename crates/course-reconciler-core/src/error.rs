//! Engine error type.
//!
//! Store calls return `anyhow::Result`; the orchestrator wraps them with the
//! phase and node they failed on before deciding whether they are fatal.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Orchestrator phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreValidate,
    Snapshot,
    UpdateMetadata,
    ReplaceContent,
    RestoreAssignments,
    PostValidate,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreValidate => "pre_validate",
            Phase::Snapshot => "snapshot",
            Phase::UpdateMetadata => "update_metadata",
            Phase::ReplaceContent => "replace_content",
            Phase::RestoreAssignments => "restore_assignments",
            Phase::PostValidate => "post_validate",
        }
    }

    /// Whether a failure in this phase aborts the reconciliation.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Phase::RestoreAssignments | Phase::PostValidate)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("course not found: {0}")]
    CourseNotFound(String),

    #[error("course {0} is already being saved by another request")]
    CourseLocked(String),

    #[error("course {course_id} changed since it was loaded (expected version {expected}, found {actual})")]
    StaleVersion {
        course_id: String,
        expected: String,
        actual: String,
    },

    #[error("{phase} failed at {context}: {cause:#}")]
    Phase {
        phase: Phase,
        context: String,
        cause: anyhow::Error,
    },
}

impl ReconcileError {
    pub fn phase(phase: Phase, context: impl Into<String>, cause: anyhow::Error) -> Self {
        ReconcileError::Phase {
            phase,
            context: context.into(),
            cause,
        }
    }

    /// Phase the error belongs to. Guard failures happen before any
    /// mutation and count as [`Phase::PreValidate`].
    pub fn failed_phase(&self) -> Phase {
        match self {
            ReconcileError::Phase { phase, .. } => *phase,
            _ => Phase::PreValidate,
        }
    }

    /// Stable machine-readable kind, carried in
    /// [`ReconciliationResult::error_code`](crate::result::ReconciliationResult::error_code).
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::InvalidSubmission(_) => "invalid_submission",
            ReconcileError::CourseNotFound(_) => "course_not_found",
            ReconcileError::CourseLocked(_) => "course_locked",
            ReconcileError::StaleVersion { .. } => "stale_version",
            ReconcileError::Phase { .. } => "phase_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_message_carries_context() {
        let err = ReconcileError::phase(
            Phase::ReplaceContent,
            "create unit 'Hello'",
            anyhow::anyhow!("disk full"),
        );
        assert_eq!(
            err.to_string(),
            "replace_content failed at create unit 'Hello': disk full"
        );
    }

    #[test]
    fn test_guard_errors_belong_to_pre_validate() {
        let err = ReconcileError::CourseLocked("c1".to_string());
        assert_eq!(err.failed_phase(), Phase::PreValidate);
        assert_eq!(err.code(), "course_locked");

        let err = ReconcileError::phase(Phase::PostValidate, "x", anyhow::anyhow!("y"));
        assert_eq!(err.failed_phase(), Phase::PostValidate);
        assert_eq!(err.code(), "phase_failed");
    }

    #[test]
    fn test_fatal_phases() {
        assert!(Phase::UpdateMetadata.is_fatal());
        assert!(Phase::ReplaceContent.is_fatal());
        assert!(!Phase::RestoreAssignments.is_fatal());
        assert!(!Phase::PostValidate.is_fatal());
    }
}
