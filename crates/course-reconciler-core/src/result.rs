//! Reconciliation output.

use std::ops::AddAssign;

use serde::Serialize;

use crate::error::Phase;
use crate::integrity::IntegrityIssue;
use crate::models::Strategy;

/// Node write counters, summed over all three levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub created: usize,
    pub updated: usize,
    /// Matched nodes that needed no write.
    pub unchanged: usize,
    /// Persisted nodes (subtrees included) the submission did not mention
    /// and that were kept.
    pub preserved: usize,
    pub deleted: usize,
}

impl AddAssign for NodeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.unchanged += rhs.unchanged;
        self.preserved += rhs.preserved;
        self.deleted += rhs.deleted;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub millis: i64,
}

/// Summary of one reconciliation.
///
/// `success` is true when content replacement completed, even if some
/// assignments could not be restored; check
/// [`fully_restored`](ReconciliationResult::fully_restored) and `warnings`.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub course_id: String,
    pub strategy: Strategy,
    pub success: bool,
    pub counts: NodeCounts,
    pub assignments_snapshotted: usize,
    pub assignments_restored: usize,
    pub integrity_score: Option<u8>,
    pub integrity_issues: Vec<IntegrityIssue>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// [`ReconcileError::code`](crate::error::ReconcileError::code) of the
    /// error that stopped the save, if any.
    pub error_code: Option<&'static str>,
    pub suggestions: Vec<String>,
    pub version_before: Option<String>,
    pub version_after: Option<String>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timings: Vec<PhaseTiming>,
}

impl ReconciliationResult {
    pub(crate) fn new(course_id: &str, strategy: Strategy) -> Self {
        Self {
            course_id: course_id.to_string(),
            strategy,
            success: false,
            counts: NodeCounts::default(),
            assignments_snapshotted: 0,
            assignments_restored: 0,
            integrity_score: None,
            integrity_issues: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            error_code: None,
            suggestions: Vec::new(),
            version_before: None,
            version_after: None,
            cache_hits: 0,
            cache_misses: 0,
            timings: Vec::new(),
        }
    }

    pub fn fully_restored(&self) -> bool {
        self.assignments_restored >= self.assignments_snapshotted
    }

    pub fn total_millis(&self) -> i64 {
        self.timings.iter().map(|t| t.millis).sum()
    }
}
