//! Assignment snapshots.
//!
//! Before any mutation, every live assignment touching the course's units is
//! captured together with the title path of the unit it points at. After a
//! destructive rebuild this is the only record of which unit used to own
//! which assignment. Snapshots live in memory for one reconciliation only.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::fetch::{fetch_course_tree, unit_paths, CourseTree};
use crate::models::{ContentNode, TitlePath};
use crate::store::Store;

/// One assignment as it was before mutation.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub assignment_id: String,
    pub assignment_title: String,
    pub unit_id: String,
    pub title_path: TitlePath,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub course_id: String,
    /// Persisted outline at snapshot time, kept for diagnostics.
    pub modules: Vec<ContentNode>,
    pub entries: Vec<SnapshotEntry>,
    pub version: String,
    /// Assignments that could not be walked to a title path.
    pub warnings: Vec<String>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fetch the course and snapshot it.
pub async fn snapshot(store: &dyn Store, course_id: &str) -> Result<Snapshot> {
    let tree = fetch_course_tree(store, course_id).await?;
    Ok(snapshot_tree(&tree))
}

/// Snapshot an already fetched tree.
pub fn snapshot_tree(tree: &CourseTree) -> Snapshot {
    let paths = unit_paths(&tree.modules);
    let mut entries = Vec::with_capacity(tree.assignments.len());
    let mut warnings = Vec::new();

    for a in tree.assignments.iter().filter(|a| !a.deleted) {
        match paths.get(&a.unit_id) {
            Some(path) => entries.push(SnapshotEntry {
                assignment_id: a.id.clone(),
                assignment_title: a.title.clone(),
                unit_id: a.unit_id.clone(),
                title_path: path.clone(),
            }),
            None => {
                warn!(assignment = %a.id, unit = %a.unit_id, "unit has no title path; skipping");
                warnings.push(format!(
                    "assignment '{}' ({}) points to unit {} which is not reachable from any module; it will not be restored",
                    a.title, a.id, a.unit_id
                ));
            }
        }
    }

    debug!(
        course = %tree.course_id,
        assignments = entries.len(),
        skipped = warnings.len(),
        "snapshot taken"
    );

    Snapshot {
        course_id: tree.course_id.clone(),
        modules: tree.modules.clone(),
        entries,
        version: tree.version.clone(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::store::memory::InMemoryStore;
    use crate::testutil::{assignment, sample_tree, seed};

    #[tokio::test]
    async fn test_snapshot_attaches_title_paths() {
        let store = InMemoryStore::new();
        let tree = seed(&store, "c1", vec![sample_tree()]).await;
        let u2 = tree[0].children[0].children[1].id.clone().unwrap();
        store.insert_assignment(assignment("a1", &u2));

        let snap = snapshot(&store, "c1").await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.entries[0].unit_id, u2);
        assert_eq!(snap.entries[0].title_path, TitlePath::new("M", "L", "U2"));
        assert!(snap.warnings.is_empty());
    }

    #[test]
    fn test_unreachable_unit_is_warned_and_skipped() {
        let tree = CourseTree {
            course_id: "c1".to_string(),
            modules: Vec::new(),
            assignments: vec![assignment("a1", "ghost")],
            version: String::new(),
            fetched_at: Utc::now(),
        };
        let snap = snapshot_tree(&tree);
        assert!(snap.is_empty());
        assert_eq!(snap.warnings.len(), 1);
        assert!(snap.warnings[0].contains("ghost"));
    }

    #[tokio::test]
    async fn test_deleted_assignments_are_not_captured() {
        let store = InMemoryStore::new();
        let tree = seed(&store, "c1", vec![sample_tree()]).await;
        let u1 = tree[0].children[0].children[0].id.clone().unwrap();
        store.insert_assignment(assignment("a1", &u1));
        store.delete_assignment("a1");

        let snap = snapshot(&store, "c1").await.unwrap();
        assert!(snap.is_empty());
    }
}
