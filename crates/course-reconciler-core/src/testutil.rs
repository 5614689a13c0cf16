//! Shared fixtures for unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::models::{
    Assignment, ContentNode, Course, CourseMetadata, NodeDraft, NodeKind,
};
use crate::store::memory::InMemoryStore;
use crate::store::Store;

/// Module "M" → lesson "L" → units "U1", "U2".
pub fn sample_tree() -> ContentNode {
    ContentNode::module("M").with_children(vec![ContentNode::lesson("L")
        .with_children(vec![ContentNode::unit("U1"), ContentNode::unit("U2")])])
}

pub fn metadata(title: &str) -> CourseMetadata {
    CourseMetadata {
        title: title.to_string(),
        description: Some("A course".to_string()),
        published: false,
    }
}

pub fn assignment(id: &str, unit_id: &str) -> Assignment {
    Assignment {
        id: id.to_string(),
        course_id: "c1".to_string(),
        unit_id: unit_id.to_string(),
        title: format!("Quiz {}", id),
        deleted: false,
    }
}

/// Create the course and write `modules` through the store, returning the
/// persisted tree.
pub async fn seed(store: &InMemoryStore, course_id: &str, modules: Vec<ContentNode>) -> Vec<ContentNode> {
    store.insert_course(course_id, metadata("Seeded"));
    for (i, m) in modules.iter().enumerate() {
        let m_id = store.create_node(course_id, &m.draft(i as i64)).await.unwrap();
        for (j, l) in m.children.iter().enumerate() {
            let l_id = store.create_node(&m_id, &l.draft(j as i64)).await.unwrap();
            for (k, u) in l.children.iter().enumerate() {
                store.create_node(&l_id, &u.draft(k as i64)).await.unwrap();
            }
        }
    }
    store.fetch_tree(course_id).await.unwrap()
}

pub fn strip_ids(nodes: &[ContentNode]) -> Vec<ContentNode> {
    nodes
        .iter()
        .map(|n| ContentNode {
            id: None,
            children: strip_ids(&n.children),
            ..n.clone()
        })
        .collect()
}

pub fn titles(nodes: &[ContentNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.title.as_str()).collect()
}

/// Wraps an [`InMemoryStore`] and fails selected writes.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    /// Creates allowed before every further create fails.
    pub creates_before_failure: Option<usize>,
    pub fail_metadata: bool,
    pub fail_repoint: bool,
    pub fail_course_assignments: bool,
    creates: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            creates_before_failure: None,
            fail_metadata: false,
            fail_repoint: false,
            fail_course_assignments: false,
            creates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.inner.get_course(course_id).await
    }

    async fn update_course_metadata(&self, course_id: &str, metadata: &CourseMetadata) -> Result<()> {
        if self.fail_metadata {
            bail!("metadata write rejected");
        }
        self.inner.update_course_metadata(course_id, metadata).await
    }

    async fn fetch_tree(&self, course_id: &str) -> Result<Vec<ContentNode>> {
        self.inner.fetch_tree(course_id).await
    }

    async fn create_node(&self, parent_id: &str, draft: &NodeDraft) -> Result<String> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        if self.creates_before_failure.is_some_and(|limit| n >= limit) {
            bail!("connection reset");
        }
        self.inner.create_node(parent_id, draft).await
    }

    async fn update_node(&self, id: &str, draft: &NodeDraft) -> Result<()> {
        self.inner.update_node(id, draft).await
    }

    async fn delete_nodes(&self, kind: NodeKind, ids: &[String]) -> Result<u64> {
        self.inner.delete_nodes(kind, ids).await
    }

    async fn assignments_for_units(&self, unit_ids: &[String]) -> Result<Vec<Assignment>> {
        self.inner.assignments_for_units(unit_ids).await
    }

    async fn assignments_for_course(&self, course_id: &str) -> Result<Vec<Assignment>> {
        if self.fail_course_assignments {
            bail!("assignment index unavailable");
        }
        self.inner.assignments_for_course(course_id).await
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        self.inner.get_assignment(id).await
    }

    async fn repoint_assignment(&self, id: &str, unit_id: &str) -> Result<bool> {
        if self.fail_repoint {
            bail!("assignment table locked");
        }
        self.inner.repoint_assignment(id, unit_id).await
    }

    async fn try_lock_course(&self, course_id: &str, holder: &str, ttl_secs: i64) -> Result<bool> {
        self.inner.try_lock_course(course_id, holder, ttl_secs).await
    }

    async fn unlock_course(&self, course_id: &str, holder: &str) -> Result<()> {
        self.inner.unlock_course(course_id, holder).await
    }
}

/// Wraps an [`InMemoryStore`] and parks the first metadata write until the
/// test releases it, so a second save can run while the first holds the
/// course lock.
pub struct GatedStore {
    pub inner: InMemoryStore,
    /// Notified when the first metadata write is parked.
    pub entered: Notify,
    /// Notify to let the parked write continue.
    pub release: Notify,
    gated: AtomicBool,
}

impl GatedStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
            gated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.inner.get_course(course_id).await
    }

    async fn update_course_metadata(&self, course_id: &str, metadata: &CourseMetadata) -> Result<()> {
        if !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.update_course_metadata(course_id, metadata).await
    }

    async fn fetch_tree(&self, course_id: &str) -> Result<Vec<ContentNode>> {
        self.inner.fetch_tree(course_id).await
    }

    async fn create_node(&self, parent_id: &str, draft: &NodeDraft) -> Result<String> {
        self.inner.create_node(parent_id, draft).await
    }

    async fn update_node(&self, id: &str, draft: &NodeDraft) -> Result<()> {
        self.inner.update_node(id, draft).await
    }

    async fn delete_nodes(&self, kind: NodeKind, ids: &[String]) -> Result<u64> {
        self.inner.delete_nodes(kind, ids).await
    }

    async fn assignments_for_units(&self, unit_ids: &[String]) -> Result<Vec<Assignment>> {
        self.inner.assignments_for_units(unit_ids).await
    }

    async fn assignments_for_course(&self, course_id: &str) -> Result<Vec<Assignment>> {
        self.inner.assignments_for_course(course_id).await
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        self.inner.get_assignment(id).await
    }

    async fn repoint_assignment(&self, id: &str, unit_id: &str) -> Result<bool> {
        self.inner.repoint_assignment(id, unit_id).await
    }

    async fn try_lock_course(&self, course_id: &str, holder: &str, ttl_secs: i64) -> Result<bool> {
        self.inner.try_lock_course(course_id, holder, ttl_secs).await
    }

    async fn unlock_course(&self, course_id: &str, holder: &str) -> Result<()> {
        self.inner.unlock_course(course_id, holder).await
    }
}
