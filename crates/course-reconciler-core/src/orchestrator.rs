//! Update orchestration.
//!
//! Sequences one save as a linear state machine:
//!
//! ```text
//! PreValidate → Snapshot → UpdateMetadata → ReplaceContent → RestoreAssignments → PostValidate → Done
//! ```
//!
//! Failure policy:
//!
//! | Phase | On failure |
//! |-------|------------|
//! | PreValidate, Snapshot | abort before any mutation |
//! | UpdateMetadata, ReplaceContent | abort, run compensations, report errors |
//! | RestoreAssignments, PostValidate | record warnings, still `success = true` |
//!
//! The store offers no transaction spanning a whole rebuild, so the save is a
//! saga: each phase that takes a snapshot registers a [`Compensation`], and a
//! fatal failure runs the registered compensations in reverse, best effort.
//!
//! A per-course advisory lock held in the store keeps two saves of the same
//! course from interleaving. It is renewed before each mutating phase; a save
//! whose lock expired and was taken over stops with `CourseLocked` before its
//! next write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::TreeCache;
use crate::error::{Phase, ReconcileError};
use crate::fetch::CourseTree;
use crate::integrity::{validate, IntegrityReport};
use crate::models::{ContentNode, CourseMetadata, NodeKind, Strategy};
use crate::rebuild::Rebuilder;
use crate::restore::{restore, restore_against};
use crate::result::{NodeCounts, PhaseTiming, ReconciliationResult};
use crate::snapshot::{snapshot_tree, Snapshot};
use crate::store::Store;

/// Tuning knobs, usually filled from the `[reconcile]` config section.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Module subtrees written concurrently.
    pub module_fan_out: usize,
    /// Lifetime of cached trees inside one reconciliation.
    pub cache_ttl_secs: i64,
    /// Age after which a course lock is considered abandoned.
    pub lock_ttl_secs: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            module_fan_out: 4,
            cache_ttl_secs: 30,
            lock_ttl_secs: 300,
        }
    }
}

/// One save submitted by the editor.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileRequest {
    pub course_id: String,
    pub metadata: CourseMetadata,
    pub tree: Vec<ContentNode>,
    pub strategy: Strategy,
    /// Version the editor loaded; a mismatch rejects the save.
    #[serde(default)]
    pub expected_version: Option<String>,
}

/// Undo step registered by a phase, run in reverse on fatal failure.
enum Compensation<'s> {
    /// Re-point every snapshotted assignment against whatever tree exists.
    RepointAssignments(&'s Snapshot),
}

/// Read-only pre-flight report.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub course_id: String,
    pub version: String,
    pub node_count: usize,
    pub assignment_count: usize,
    pub integrity: IntegrityReport,
    pub suggestions: Vec<String>,
}

pub struct Reconciler<'a> {
    store: &'a dyn Store,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn Store, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    /// Save a course. Always returns a summary; fatal problems are in
    /// `errors` with `success == false` and `error_code` set.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconciliationResult {
        let course_id = request.course_id.as_str();
        let mut result = ReconciliationResult::new(course_id, request.strategy);
        let holder = Uuid::new_v4().to_string();

        info!(course = %course_id, strategy = %request.strategy, "reconcile started");

        if let Err(err) = self.hold_lock(course_id, &holder, Phase::PreValidate).await {
            warn!(course = %course_id, "{}", err);
            fail(&mut result, &err);
            return result;
        }

        let mut cache = TreeCache::new(self.options.cache_ttl_secs);
        if let Err(err) = self.run_phases(request, &holder, &mut cache, &mut result).await {
            warn!(course = %course_id, error = %err, "reconcile aborted");
            result.success = false;
            fail(&mut result, &err);
        }

        if let Err(e) = self.store.unlock_course(course_id, &holder).await {
            result
                .warnings
                .push(format!("failed to release lock on course {}: {:#}", course_id, e));
        }

        result.cache_hits = cache.hits();
        result.cache_misses = cache.misses();

        info!(
            course = %course_id,
            success = result.success,
            created = result.counts.created,
            updated = result.counts.updated,
            preserved = result.counts.preserved,
            restored = result.assignments_restored,
            snapshotted = result.assignments_snapshotted,
            warnings = result.warnings.len(),
            millis = result.total_millis(),
            "reconcile finished"
        );
        result
    }

    /// Pre-flight check: integrity and suggestions, no mutation, no lock.
    pub async fn validate_only(&self, course_id: &str) -> Result<ValidationReport, ReconcileError> {
        self.require_course(course_id).await?;
        let mut cache = TreeCache::new(self.options.cache_ttl_secs);
        let tree = cache
            .get_or_fetch(self.store, course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PreValidate, "load tree", e))?;
        let integrity = validate(self.store, &tree)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PreValidate, "score tree", e))?;

        let mut suggestions = Vec::new();
        if let Err(e) = check_submission(&tree.modules) {
            suggestions.push(format!("stored outline is malformed: {}", e));
        }
        suggestions.extend(outline_suggestions(&tree.modules));

        Ok(ValidationReport {
            course_id: course_id.to_string(),
            version: tree.version.clone(),
            node_count: tree.node_count(),
            assignment_count: integrity.assignments_checked,
            integrity,
            suggestions,
        })
    }

    /// Take or refresh the course lock for `holder`. Refreshing restarts the
    /// TTL, so a long save keeps the lock as long as it keeps renewing.
    async fn hold_lock(&self, course_id: &str, holder: &str, phase: Phase) -> Result<(), ReconcileError> {
        match self
            .store
            .try_lock_course(course_id, holder, self.options.lock_ttl_secs)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReconcileError::CourseLocked(course_id.to_string())),
            Err(e) => Err(ReconcileError::phase(phase, "hold course lock", e)),
        }
    }

    async fn run_phases(
        &self,
        request: &ReconcileRequest,
        holder: &str,
        cache: &mut TreeCache,
        result: &mut ReconciliationResult,
    ) -> Result<(), ReconcileError> {
        let course_id = request.course_id.as_str();

        let started = Utc::now();
        let current = self.pre_validate(request, cache, result).await;
        record(result, Phase::PreValidate, started);
        let current = current?;

        let started = Utc::now();
        let snap = self.take_snapshot(course_id, cache).await;
        record(result, Phase::Snapshot, started);
        let snap = snap?;
        result.assignments_snapshotted = snap.len();
        result.warnings.extend(snap.warnings.iter().cloned());

        let saga = vec![Compensation::RepointAssignments(&snap)];

        let started = Utc::now();
        let meta = self.update_metadata(request, holder).await;
        record(result, Phase::UpdateMetadata, started);
        if let Err(err) = meta {
            self.handle_failure(err, &saga, result).await?;
        }

        let started = Utc::now();
        let rebuilt = self.replace_content(request, holder, &current).await;
        cache.invalidate(course_id);
        record(result, Phase::ReplaceContent, started);
        match rebuilt {
            Ok(counts) => result.counts = counts,
            Err(err) => self.handle_failure(err, &saga, result).await?,
        }
        result.success = true;

        let started = Utc::now();
        let restored = self.restore_assignments(&snap, cache, result).await;
        record(result, Phase::RestoreAssignments, started);
        if let Err(err) = restored {
            self.handle_failure(err, &saga, result).await?;
        }

        let started = Utc::now();
        let validated = self.post_validate(course_id, cache, result).await;
        record(result, Phase::PostValidate, started);
        if let Err(err) = validated {
            self.handle_failure(err, &saga, result).await?;
        }

        Ok(())
    }

    /// Fatal phases (see [`Phase::is_fatal`]) run the saga and abort; the
    /// others become warnings and the save goes on.
    async fn handle_failure(
        &self,
        err: ReconcileError,
        saga: &[Compensation<'_>],
        result: &mut ReconciliationResult,
    ) -> Result<(), ReconcileError> {
        let phase = err.failed_phase();
        if phase.is_fatal() {
            self.compensate(saga, result).await;
            return Err(err);
        }
        warn!(course = %result.course_id, %phase, error = %err, "non-fatal phase failure");
        result.warnings.push(err.to_string());
        Ok(())
    }

    async fn require_course(&self, course_id: &str) -> Result<(), ReconcileError> {
        let course = self
            .store
            .get_course(course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PreValidate, format!("course {}", course_id), e))?;
        match course {
            Some(_) => Ok(()),
            None => Err(ReconcileError::CourseNotFound(course_id.to_string())),
        }
    }

    async fn pre_validate(
        &self,
        request: &ReconcileRequest,
        cache: &mut TreeCache,
        result: &mut ReconciliationResult,
    ) -> Result<CourseTree, ReconcileError> {
        let course_id = request.course_id.as_str();
        self.require_course(course_id).await?;

        if request.metadata.title.trim().is_empty() {
            return Err(ReconcileError::InvalidSubmission(
                "course title must not be empty".to_string(),
            ));
        }
        check_submission(&request.tree)?;

        if request.metadata.description.as_deref().map_or(true, |d| d.trim().is_empty()) {
            result
                .suggestions
                .push("course has no description".to_string());
        }
        result.suggestions.extend(outline_suggestions(&request.tree));

        let current = cache
            .get_or_fetch(self.store, course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PreValidate, "load current tree", e))?;
        result.version_before = Some(current.version.clone());

        if let Some(expected) = &request.expected_version {
            if *expected != current.version {
                return Err(ReconcileError::StaleVersion {
                    course_id: course_id.to_string(),
                    expected: expected.clone(),
                    actual: current.version.clone(),
                });
            }
        }
        Ok(current)
    }

    async fn take_snapshot(
        &self,
        course_id: &str,
        cache: &mut TreeCache,
    ) -> Result<Snapshot, ReconcileError> {
        let tree = cache
            .get_or_fetch(self.store, course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::Snapshot, "load tree", e))?;
        Ok(snapshot_tree(&tree))
    }

    async fn update_metadata(&self, request: &ReconcileRequest, holder: &str) -> Result<(), ReconcileError> {
        let course_id = request.course_id.as_str();
        self.hold_lock(course_id, holder, Phase::UpdateMetadata).await?;
        self.store
            .update_course_metadata(course_id, &request.metadata)
            .await
            .map_err(|e| ReconcileError::phase(Phase::UpdateMetadata, format!("course {}", course_id), e))
    }

    async fn replace_content(
        &self,
        request: &ReconcileRequest,
        holder: &str,
        current: &CourseTree,
    ) -> Result<NodeCounts, ReconcileError> {
        let course_id = request.course_id.as_str();
        self.hold_lock(course_id, holder, Phase::ReplaceContent).await?;
        Rebuilder::new(self.store, self.options.module_fan_out)
            .rebuild(course_id, &current.modules, &request.tree, request.strategy)
            .await
            .map_err(|e| ReconcileError::phase(Phase::ReplaceContent, format!("course {}", course_id), e))
    }

    async fn restore_assignments(
        &self,
        snap: &Snapshot,
        cache: &mut TreeCache,
        result: &mut ReconciliationResult,
    ) -> Result<(), ReconcileError> {
        if snap.is_empty() {
            return Ok(());
        }
        let tree = cache
            .get_or_fetch(self.store, &snap.course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::RestoreAssignments, "reload tree", e))?;
        let outcome = restore_against(self.store, snap, &tree.modules).await;
        if outcome.repointed > 0 {
            cache.invalidate(&snap.course_id);
        }
        if outcome.is_partial(snap) {
            warn!(
                course = %snap.course_id,
                restored = outcome.restored,
                snapshotted = snap.len(),
                "some assignments need manual reattachment"
            );
        }
        result.assignments_restored = outcome.restored;
        result.warnings.extend(outcome.warnings);
        Ok(())
    }

    async fn post_validate(
        &self,
        course_id: &str,
        cache: &mut TreeCache,
        result: &mut ReconciliationResult,
    ) -> Result<(), ReconcileError> {
        let tree = cache
            .get_or_fetch(self.store, course_id)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PostValidate, "reload tree", e))?;
        let report = validate(self.store, &tree)
            .await
            .map_err(|e| ReconcileError::phase(Phase::PostValidate, "score tree", e))?;
        result.warnings.extend(report.warnings());
        result.integrity_score = Some(report.score);
        result.integrity_issues = report.issues;
        result.version_after = Some(tree.version);
        Ok(())
    }

    async fn compensate(&self, saga: &[Compensation<'_>], result: &mut ReconciliationResult) {
        for step in saga.iter().rev() {
            match step {
                Compensation::RepointAssignments(snap) => {
                    if snap.is_empty() {
                        continue;
                    }
                    match restore(self.store, snap).await {
                        Ok(outcome) => {
                            result.assignments_restored = outcome.restored;
                            for w in outcome.warnings {
                                result.warnings.push(format!("emergency restore: {}", w));
                            }
                        }
                        Err(e) => {
                            warn!(course = %snap.course_id, error = %e, "emergency restore failed");
                            result
                                .warnings
                                .push(format!("emergency restore failed: {:#}", e));
                        }
                    }
                }
            }
        }
    }
}

fn fail(result: &mut ReconciliationResult, err: &ReconcileError) {
    result.errors.push(err.to_string());
    result.error_code = Some(err.code());
}

fn record(result: &mut ReconciliationResult, phase: Phase, started: DateTime<Utc>) {
    result.timings.push(PhaseTiming {
        phase,
        millis: (Utc::now() - started).num_milliseconds(),
    });
}

/// Reject outlines that cannot be written: blank titles, or a node under a
/// parent that cannot own its kind.
pub fn check_submission(modules: &[ContentNode]) -> Result<(), ReconcileError> {
    let mut problems = Vec::new();
    check_level(modules, NodeKind::Module, "", &mut problems);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::InvalidSubmission(problems.join("; ")))
    }
}

fn check_level(nodes: &[ContentNode], expected: NodeKind, prefix: &str, problems: &mut Vec<String>) {
    for (i, node) in nodes.iter().enumerate() {
        let here = if prefix.is_empty() {
            format!("{} #{}", node.kind(), i + 1)
        } else {
            format!("{} > {} #{}", prefix, node.kind(), i + 1)
        };

        if node.kind() != expected {
            problems.push(format!("{}: expected a {}", here, expected));
            continue;
        }
        if node.title.trim().is_empty() {
            problems.push(format!("{}: title must not be empty", here));
        }
        match expected.child_kind() {
            Some(child) => check_level(&node.children, child, &here, problems),
            None if !node.children.is_empty() => {
                problems.push(format!("{}: units cannot have children", here));
            }
            None => {}
        }
    }
}

/// Advisory hints about an outline; never block a save.
pub fn outline_suggestions(modules: &[ContentNode]) -> Vec<String> {
    let mut out = Vec::new();
    for m in modules {
        if m.children.is_empty() {
            out.push(format!("module '{}' has no lessons", m.title));
        }
        if m.body.description().map_or(true, |d| d.trim().is_empty()) {
            out.push(format!("module '{}' has no description", m.title));
        }
        for l in &m.children {
            if l.children.is_empty() {
                out.push(format!("lesson '{} : {}' has no units", m.title, l.title));
            }
            if l.body.description().map_or(true, |d| d.trim().is_empty()) {
                out.push(format!("lesson '{} : {}' has no description", m.title, l.title));
            }
        }
    }
    out
}
