//! `courserec reconcile` and `courserec validate`.
//!
//! The submission file is JSON with a `tree` array of modules and an optional
//! `metadata` object; a document written by `courserec course show --json`
//! is accepted as is. Without `metadata` the course's current metadata is
//! kept.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use course_reconciler_core::orchestrator::ValidationReport;
use course_reconciler_core::{
    ContentNode, CourseMetadata, ReconcileError, ReconcileRequest, ReconciliationResult,
    Reconciler, Store, Strategy,
};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub metadata: Option<CourseMetadata>,
    pub tree: Vec<ContentNode>,
}

pub fn read_submission(path: &Path) -> Result<Submission> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse submission file: {}", path.display()))
}

/// Run one reconciliation against the configured database.
pub async fn reconcile_course(
    config: &Config,
    store: &SqliteStore,
    course_id: &str,
    submission: Submission,
    strategy: Strategy,
    expected_version: Option<String>,
) -> Result<ReconciliationResult> {
    let metadata = match submission.metadata {
        Some(m) => m,
        None => match store.get_course(course_id).await? {
            Some(course) => course.metadata,
            None => return Err(ReconcileError::CourseNotFound(course_id.to_string()).into()),
        },
    };

    let request = ReconcileRequest {
        course_id: course_id.to_string(),
        metadata,
        tree: submission.tree,
        strategy,
        expected_version,
    };
    let reconciler = Reconciler::new(store, config.reconcile.options());
    Ok(reconciler.reconcile(&request).await)
}

pub async fn run_reconcile(
    config: &Config,
    course_id: &str,
    file: &Path,
    strategy: Option<String>,
    expected_version: Option<String>,
    json: bool,
) -> Result<()> {
    let strategy = match strategy {
        Some(s) => s.parse()?,
        None => config.reconcile.strategy()?,
    };
    let submission = read_submission(file)?;

    let store = SqliteStore::open(config).await?;
    let result = reconcile_course(config, &store, course_id, submission, strategy, expected_version).await;
    store.close().await;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if !result.success {
        bail!("reconciliation of course {} failed", course_id);
    }
    Ok(())
}

fn print_summary(result: &ReconciliationResult) {
    println!("reconcile {} ({})", result.course_id, result.strategy);
    println!("  created: {}", result.counts.created);
    println!("  updated: {}", result.counts.updated);
    println!("  unchanged: {}", result.counts.unchanged);
    println!("  preserved: {}", result.counts.preserved);
    println!("  deleted: {}", result.counts.deleted);
    println!(
        "  assignments restored: {}/{}",
        result.assignments_restored, result.assignments_snapshotted
    );
    if let Some(score) = result.integrity_score {
        println!("  integrity score: {}", score);
    }
    if let Some(version) = &result.version_after {
        println!("  version: {}", version);
    }
    for s in &result.suggestions {
        println!("  suggestion: {}", s);
    }
    for w in &result.warnings {
        println!("  warning: {}", w);
    }
    for e in &result.errors {
        println!("  error: {}", e);
    }
    println!("{}", if result.success { "ok" } else { "failed" });
}

pub async fn validate_course(config: &Config, store: &SqliteStore, course_id: &str) -> Result<ValidationReport> {
    let reconciler = Reconciler::new(store, config.reconcile.options());
    Ok(reconciler.validate_only(course_id).await?)
}

pub async fn run_validate(config: &Config, course_id: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let report = validate_course(config, &store, course_id).await;
    store.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("validate {}", report.course_id);
    println!("  version: {}", report.version);
    println!("  nodes: {}", report.node_count);
    println!("  assignments: {}", report.assignment_count);
    println!("  integrity score: {}", report.integrity.score);
    for issue in &report.integrity.issues {
        println!("  issue: {}", issue.message);
    }
    for s in &report.suggestions {
        println!("  suggestion: {}", s);
    }
    Ok(())
}
