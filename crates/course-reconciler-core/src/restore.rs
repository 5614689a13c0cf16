//! Assignment restoration after a rebuild.
//!
//! For every snapshotted assignment:
//!
//! 1. If the assignment was deleted since the snapshot, skip it with a warning.
//! 2. If the unit it currently points at still exists, it is intact (the
//!    incremental strategy keeps identities) and counts as restored.
//! 3. Otherwise look up the unit with exactly the same
//!    `(module, lesson, unit)` title path, first match in render order, and
//!    re-point the assignment there.
//! 4. If no unit has that path, leave the assignment alone and warn. A
//!    destination is never guessed.
//!
//! Individual store failures are recorded as warnings; restoration carries
//! on with the next assignment.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::fetch::{find_unit_by_path, unit_ids};
use crate::models::ContentNode;
use crate::snapshot::Snapshot;
use crate::store::Store;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreOutcome {
    /// Assignments that point at a live unit afterwards.
    pub restored: usize,
    /// Of `restored`, how many needed a write.
    pub repointed: usize,
    pub warnings: Vec<String>,
}

impl RestoreOutcome {
    pub fn is_partial(&self, snapshot: &Snapshot) -> bool {
        self.restored < snapshot.len()
    }
}

/// Restore against the course's current tree.
pub async fn restore(store: &dyn Store, snapshot: &Snapshot) -> Result<RestoreOutcome> {
    let modules = store
        .fetch_tree(&snapshot.course_id)
        .await
        .with_context(|| format!("failed to reload tree of course {}", snapshot.course_id))?;
    Ok(restore_against(store, snapshot, &modules).await)
}

/// Restore against an already loaded tree.
pub async fn restore_against(
    store: &dyn Store,
    snapshot: &Snapshot,
    modules: &[ContentNode],
) -> RestoreOutcome {
    let live_units: HashSet<String> = unit_ids(modules).into_iter().collect();
    let mut outcome = RestoreOutcome::default();

    for entry in &snapshot.entries {
        let current = match store.get_assignment(&entry.assignment_id).await {
            Ok(Some(a)) if !a.deleted => a,
            Ok(_) => {
                outcome.warnings.push(format!(
                    "assignment '{}' ({}) was deleted during the save; skipped",
                    entry.assignment_title, entry.assignment_id
                ));
                continue;
            }
            Err(e) => {
                warn!(assignment = %entry.assignment_id, error = %e, "assignment lookup failed");
                outcome.warnings.push(format!(
                    "assignment '{}' ({}) could not be read: {:#}",
                    entry.assignment_title, entry.assignment_id, e
                ));
                continue;
            }
        };

        if live_units.contains(&current.unit_id) {
            outcome.restored += 1;
            continue;
        }

        let Some(target) = find_unit_by_path(modules, &entry.title_path) else {
            warn!(assignment = %entry.assignment_id, path = %entry.title_path, "no unit at title path");
            outcome.warnings.push(format!(
                "assignment '{}' ({}) could not be re-attached: no unit at '{}'",
                entry.assignment_title, entry.assignment_id, entry.title_path
            ));
            continue;
        };

        match store.repoint_assignment(&entry.assignment_id, target).await {
            Ok(true) => {
                debug!(assignment = %entry.assignment_id, from = %current.unit_id, to = %target, "re-pointed");
                outcome.restored += 1;
                outcome.repointed += 1;
            }
            Ok(false) => outcome.warnings.push(format!(
                "assignment '{}' ({}) was deleted during the save; skipped",
                entry.assignment_title, entry.assignment_id
            )),
            Err(e) => {
                warn!(assignment = %entry.assignment_id, error = %e, "re-point failed");
                outcome.warnings.push(format!(
                    "assignment '{}' ({}) could not be re-attached to '{}': {:#}",
                    entry.assignment_title, entry.assignment_id, entry.title_path, e
                ));
            }
        }
    }

    outcome
}
