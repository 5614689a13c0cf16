//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Sibling ties on `sort_position` are broken by insertion order, matching
//! the SQLite store's `rowid` ordering.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Assignment, ContentNode, Course, CourseMetadata, NodeBody, NodeDraft, NodeKind,
};

use super::Store;

struct StoredNode {
    parent_id: String,
    seq: u64,
    title: String,
    sort_position: i64,
    body: NodeBody,
}

impl StoredNode {
    fn kind(&self) -> NodeKind {
        self.body.kind()
    }
}

struct CourseLock {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// In-memory store.
pub struct InMemoryStore {
    courses: RwLock<HashMap<String, Course>>,
    nodes: RwLock<HashMap<String, StoredNode>>,
    next_seq: RwLock<u64>,
    assignments: RwLock<Vec<Assignment>>,
    locks: RwLock<HashMap<String, CourseLock>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            next_seq: RwLock::new(0),
            assignments: RwLock::new(Vec::new()),
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Create or replace a course record.
    pub fn insert_course(&self, course_id: &str, metadata: CourseMetadata) {
        let mut courses = self.courses.write().unwrap();
        courses.insert(
            course_id.to_string(),
            Course {
                id: course_id.to_string(),
                metadata,
                updated_at: Utc::now(),
            },
        );
    }

    /// Register an assignment, as the quiz subsystem would.
    pub fn insert_assignment(&self, assignment: Assignment) {
        let mut assignments = self.assignments.write().unwrap();
        assignments.retain(|a| a.id != assignment.id);
        assignments.push(assignment);
    }

    /// Soft-delete an assignment.
    pub fn delete_assignment(&self, id: &str) -> bool {
        let mut assignments = self.assignments.write().unwrap();
        match assignments.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    fn children_of(nodes: &HashMap<String, StoredNode>, parent_id: &str, kind: NodeKind) -> Vec<ContentNode> {
        let mut rows: Vec<(&String, &StoredNode)> = nodes
            .iter()
            .filter(|(_, n)| n.parent_id == parent_id && n.kind() == kind)
            .collect();
        rows.sort_by_key(|(_, n)| (n.sort_position, n.seq));

        rows.into_iter()
            .map(|(id, n)| ContentNode {
                id: Some(id.clone()),
                title: n.title.clone(),
                sort_position: n.sort_position,
                body: n.body.clone(),
                children: match kind.child_kind() {
                    Some(child) => Self::children_of(nodes, id, child),
                    None => Vec::new(),
                },
            })
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        let courses = self.courses.read().unwrap();
        Ok(courses.get(course_id).cloned())
    }

    async fn update_course_metadata(
        &self,
        course_id: &str,
        metadata: &CourseMetadata,
    ) -> Result<()> {
        let mut courses = self.courses.write().unwrap();
        let course = match courses.get_mut(course_id) {
            Some(c) => c,
            None => bail!("course not found: {}", course_id),
        };
        course.metadata = metadata.clone();
        course.updated_at = Utc::now();
        Ok(())
    }

    async fn fetch_tree(&self, course_id: &str) -> Result<Vec<ContentNode>> {
        let nodes = self.nodes.read().unwrap();
        Ok(Self::children_of(&nodes, course_id, NodeKind::Module))
    }

    async fn create_node(&self, parent_id: &str, draft: &NodeDraft) -> Result<String> {
        let kind = draft.kind();
        let mut nodes = self.nodes.write().unwrap();

        let parent_ok = match kind {
            NodeKind::Module => self.courses.read().unwrap().contains_key(parent_id),
            NodeKind::Lesson => nodes
                .get(parent_id)
                .is_some_and(|p| p.kind() == NodeKind::Module),
            NodeKind::Unit => nodes
                .get(parent_id)
                .is_some_and(|p| p.kind() == NodeKind::Lesson),
        };
        if !parent_ok {
            bail!("cannot create {}: parent {} not found", kind, parent_id);
        }

        let seq = {
            let mut next = self.next_seq.write().unwrap();
            *next += 1;
            *next
        };
        let id = Uuid::new_v4().to_string();
        nodes.insert(
            id.clone(),
            StoredNode {
                parent_id: parent_id.to_string(),
                seq,
                title: draft.title.clone(),
                sort_position: draft.sort_position,
                body: draft.body.clone(),
            },
        );
        Ok(id)
    }

    async fn update_node(&self, id: &str, draft: &NodeDraft) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = match nodes.get_mut(id) {
            Some(n) => n,
            None => bail!("{} not found: {}", draft.kind(), id),
        };
        if node.kind() != draft.kind() {
            bail!(
                "cannot update {} {} with a {} payload",
                node.kind(),
                id,
                draft.kind()
            );
        }
        node.title = draft.title.clone();
        node.sort_position = draft.sort_position;
        node.body = draft.body.clone();
        Ok(())
    }

    async fn delete_nodes(&self, kind: NodeKind, ids: &[String]) -> Result<u64> {
        let mut nodes = self.nodes.write().unwrap();
        let mut removed = 0u64;
        for id in ids {
            if nodes.get(id).is_some_and(|n| n.kind() == kind) {
                nodes.remove(id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn assignments_for_units(&self, unit_ids: &[String]) -> Result<Vec<Assignment>> {
        let wanted: HashSet<&str> = unit_ids.iter().map(String::as_str).collect();
        let assignments = self.assignments.read().unwrap();
        Ok(assignments
            .iter()
            .filter(|a| !a.deleted && wanted.contains(a.unit_id.as_str()))
            .cloned()
            .collect())
    }

    async fn assignments_for_course(&self, course_id: &str) -> Result<Vec<Assignment>> {
        let assignments = self.assignments.read().unwrap();
        Ok(assignments
            .iter()
            .filter(|a| !a.deleted && a.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        let assignments = self.assignments.read().unwrap();
        Ok(assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn repoint_assignment(&self, id: &str, unit_id: &str) -> Result<bool> {
        let mut assignments = self.assignments.write().unwrap();
        match assignments.iter_mut().find(|a| a.id == id && !a.deleted) {
            Some(a) => {
                a.unit_id = unit_id.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_lock_course(&self, course_id: &str, holder: &str, ttl_secs: i64) -> Result<bool> {
        let now = Utc::now();
        let mut locks = self.locks.write().unwrap();
        if let Some(existing) = locks.get(course_id) {
            let expired = now - existing.acquired_at >= Duration::seconds(ttl_secs);
            if existing.holder != holder && !expired {
                return Ok(false);
            }
        }
        locks.insert(
            course_id.to_string(),
            CourseLock {
                holder: holder.to_string(),
                acquired_at: now,
            },
        );
        Ok(true)
    }

    async fn unlock_course(&self, course_id: &str, holder: &str) -> Result<()> {
        let mut locks = self.locks.write().unwrap();
        if locks.get(course_id).is_some_and(|l| l.holder == holder) {
            locks.remove(course_id);
        }
        Ok(())
    }
}
