//! Tree fetching and version fingerprints.
//!
//! A [`CourseTree`] is the persisted outline of one course plus every live
//! assignment that points into it. Its `version` is a SHA-256 over the
//! serialized outline (identities included), used as an optimistic
//! concurrency token by editors that want to detect a stale view.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::{Assignment, ContentNode, TitlePath};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct CourseTree {
    pub course_id: String,
    pub modules: Vec<ContentNode>,
    /// Live assignments whose unit is in `modules`.
    pub assignments: Vec<Assignment>,
    pub version: String,
    pub fetched_at: DateTime<Utc>,
}

impl CourseTree {
    pub fn unit_ids(&self) -> Vec<String> {
        unit_ids(&self.modules)
    }

    pub fn node_count(&self) -> usize {
        self.modules.iter().map(ContentNode::subtree_len).sum()
    }
}

/// Load the tree of a course and the assignments referencing its units.
pub async fn fetch_course_tree(store: &dyn Store, course_id: &str) -> Result<CourseTree> {
    let modules = store
        .fetch_tree(course_id)
        .await
        .with_context(|| format!("failed to load tree of course {}", course_id))?;
    let ids = unit_ids(&modules);
    let assignments = if ids.is_empty() {
        Vec::new()
    } else {
        store
            .assignments_for_units(&ids)
            .await
            .with_context(|| format!("failed to load assignments of course {}", course_id))?
    };
    let version = tree_fingerprint(&modules);

    Ok(CourseTree {
        course_id: course_id.to_string(),
        modules,
        assignments,
        version,
        fetched_at: Utc::now(),
    })
}

/// SHA-256 hex digest of an outline's structure and content.
pub fn tree_fingerprint(modules: &[ContentNode]) -> String {
    let mut hasher = Sha256::new();
    // Serializing a Vec of plain structs cannot fail.
    let encoded = serde_json::to_vec(modules).unwrap_or_default();
    hasher.update(&encoded);
    format!("{:x}", hasher.finalize())
}

/// Ids of every unit in an outline, in render order.
pub fn unit_ids(modules: &[ContentNode]) -> Vec<String> {
    modules
        .iter()
        .flat_map(|m| m.children.iter())
        .flat_map(|l| l.children.iter())
        .filter_map(|u| u.id.clone())
        .collect()
}

/// Map of unit id to its title path.
pub fn unit_paths(modules: &[ContentNode]) -> HashMap<String, TitlePath> {
    let mut paths = HashMap::new();
    for m in modules {
        for l in &m.children {
            for u in &l.children {
                if let Some(id) = &u.id {
                    paths.insert(id.clone(), TitlePath::new(&m.title, &l.title, &u.title));
                }
            }
        }
    }
    paths
}

/// Id of the first unit, in render order, whose title path equals `path`
/// exactly (case-sensitive).
pub fn find_unit_by_path<'a>(modules: &'a [ContentNode], path: &TitlePath) -> Option<&'a str> {
    modules
        .iter()
        .filter(|m| m.title == path.module)
        .flat_map(|m| m.children.iter())
        .filter(|l| l.title == path.lesson)
        .flat_map(|l| l.children.iter())
        .find(|u| u.title == path.unit)
        .and_then(|u| u.id.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::testutil::{assignment, sample_tree, seed};

    #[tokio::test]
    async fn test_fetch_loads_tree_and_unit_assignments() {
        let store = InMemoryStore::new();
        let tree = seed(&store, "c1", vec![sample_tree()]).await;
        let u1 = tree[0].children[0].children[0].id.clone().unwrap();
        store.insert_assignment(assignment("a1", &u1));
        store.insert_assignment(assignment("a-elsewhere", "not-in-course"));

        let fetched = fetch_course_tree(&store, "c1").await.unwrap();
        assert_eq!(fetched.node_count(), 4);
        assert_eq!(fetched.assignments.len(), 1);
        assert_eq!(fetched.assignments[0].id, "a1");
        assert_eq!(fetched.unit_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_tracks_changes() {
        let store = InMemoryStore::new();
        let tree = seed(&store, "c1", vec![sample_tree()]).await;
        let before = fetch_course_tree(&store, "c1").await.unwrap().version;
        assert_eq!(before, tree_fingerprint(&tree));

        let unit = &tree[0].children[0].children[1];
        let mut draft = unit.draft(unit.sort_position);
        draft.title = "U2 (edited)".to_string();
        store
            .update_node(unit.id.as_deref().unwrap(), &draft)
            .await
            .unwrap();

        let after = fetch_course_tree(&store, "c1").await.unwrap().version;
        assert_ne!(before, after);
    }

    #[test]
    fn test_find_unit_by_path_is_exact_and_first_wins() {
        let modules = vec![ContentNode::module("M").with_id("m").with_children(vec![
            ContentNode::lesson("L").with_id("l").with_children(vec![
                ContentNode::unit("U").with_id("first"),
                ContentNode::unit("U").with_id("second"),
            ]),
        ])];
        assert_eq!(
            find_unit_by_path(&modules, &TitlePath::new("M", "L", "U")),
            Some("first")
        );
        assert_eq!(find_unit_by_path(&modules, &TitlePath::new("M", "L", "u")), None);
        assert_eq!(unit_paths(&modules)["second"], TitlePath::new("M", "L", "U"));
    }
}
