//! Storage abstraction for Course Reconciler.
//!
//! The [`Store`] trait is the full contract the engine needs from the
//! persistent store: course metadata, nested tree reads, per-node writes,
//! assignment lookups and a per-course advisory lock. Nothing in the engine
//! talks to a database directly.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Timeout and retry policy, if any, belongs to the implementation.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Assignment, ContentNode, Course, CourseMetadata, NodeDraft, NodeKind};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_course`](Store::get_course) | Read course metadata |
/// | [`update_course_metadata`](Store::update_course_metadata) | Write course metadata |
/// | [`fetch_tree`](Store::fetch_tree) | Modules → lessons → units in one call |
/// | [`create_node`](Store::create_node) | Insert one node under a parent |
/// | [`update_node`](Store::update_node) | Patch one node in place |
/// | [`delete_nodes`](Store::delete_nodes) | Delete nodes of one kind by id |
/// | [`assignments_for_units`](Store::assignments_for_units) | Live assignments on a unit set |
/// | [`assignments_for_course`](Store::assignments_for_course) | Live assignments of a course |
/// | [`get_assignment`](Store::get_assignment) | One assignment by id |
/// | [`repoint_assignment`](Store::repoint_assignment) | Change an assignment's unit |
/// | [`try_lock_course`](Store::try_lock_course) | Acquire the advisory lock |
/// | [`unlock_course`](Store::unlock_course) | Release the advisory lock |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;

    /// Errors if the course does not exist.
    async fn update_course_metadata(&self, course_id: &str, metadata: &CourseMetadata)
        -> Result<()>;

    /// Full persisted tree of a course, every level ordered by
    /// `sort_position`. Every returned node carries `Some(id)`.
    async fn fetch_tree(&self, course_id: &str) -> Result<Vec<ContentNode>>;

    /// Insert a node and return its new identity.
    ///
    /// `parent_id` is the course id for modules, the module id for lessons
    /// and the lesson id for units.
    async fn create_node(&self, parent_id: &str, draft: &NodeDraft) -> Result<String>;

    /// Overwrite the mutable fields and position of an existing node.
    async fn update_node(&self, id: &str, draft: &NodeDraft) -> Result<()>;

    /// Delete nodes of `kind` by id. Does not cascade; callers delete
    /// children first. Returns the number of rows removed.
    async fn delete_nodes(&self, kind: NodeKind, ids: &[String]) -> Result<u64>;

    /// Non-deleted assignments whose `unit_id` is in `unit_ids`.
    async fn assignments_for_units(&self, unit_ids: &[String]) -> Result<Vec<Assignment>>;

    /// Non-deleted assignments belonging to a course, whatever unit they
    /// point at.
    async fn assignments_for_course(&self, course_id: &str) -> Result<Vec<Assignment>>;

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>>;

    /// Point an assignment at another unit. Returns `false` when the
    /// assignment no longer exists or has been deleted.
    async fn repoint_assignment(&self, id: &str, unit_id: &str) -> Result<bool>;

    /// Take the per-course reconciliation lock for `holder`.
    ///
    /// Returns `false` while another holder owns an unexpired lock. Locks
    /// older than `ttl_secs` are treated as abandoned.
    async fn try_lock_course(&self, course_id: &str, holder: &str, ttl_secs: i64) -> Result<bool>;

    /// Release the lock if `holder` owns it.
    async fn unlock_course(&self, course_id: &str, holder: &str) -> Result<()>;
}
