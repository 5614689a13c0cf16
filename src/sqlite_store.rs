//! SQLite-backed [`Store`].
//!
//! One table per tree level (`modules`, `lessons`, `units`) plus `courses`,
//! `assignments` and `course_locks`; see [`crate::migrate`]. Siblings are
//! ordered by `sort_position`, then `rowid`.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use course_reconciler_core::models::{Course, NodeDraft};
use course_reconciler_core::{
    Assignment, ContentNode, CourseMetadata, NodeBody, NodeKind, Store,
};

use crate::config::Config;
use crate::db;

/// SQLite binds are capped, so `IN (...)` lists are split.
const IN_CHUNK: usize = 500;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert_course(&self, course_id: &str, metadata: &CourseMetadata) -> Result<()> {
        sqlx::query(
            "INSERT INTO courses (id, title, description, published, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(&metadata.title)
        .bind(&metadata.description)
        .bind(metadata.published)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert course {}", course_id))?;
        Ok(())
    }

    pub async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            "INSERT INTO assignments (id, course_id, unit_id, title, deleted, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&assignment.id)
        .bind(&assignment.course_id)
        .bind(&assignment.unit_id)
        .bind(&assignment.title)
        .bind(assignment.deleted)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert assignment {}", assignment.id))?;
        Ok(())
    }

    /// Soft-delete. Returns false if the assignment does not exist or is
    /// already deleted.
    pub async fn delete_assignment(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE assignments SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, table: &str, id: &str) -> Result<bool> {
        let row = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = ?", table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn table_for(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Module => "modules",
        NodeKind::Lesson => "lessons",
        NodeKind::Unit => "units",
    }
}

fn parent_table(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Module => "courses",
        NodeKind::Lesson => "modules",
        NodeKind::Unit => "lessons",
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn assignment_from_row(row: &SqliteRow) -> Assignment {
    Assignment {
        id: row.get("id"),
        course_id: row.get("course_id"),
        unit_id: row.get("unit_id"),
        title: row.get("title"),
        deleted: row.get("deleted"),
    }
}

fn node_from_row(row: &SqliteRow, body: NodeBody) -> ContentNode {
    ContentNode {
        id: Some(row.get("id")),
        title: row.get("title"),
        sort_position: row.get("sort_position"),
        body,
        children: Vec::new(),
    }
}

/// Group rows under their parent id, keeping query order.
fn group_by_parent(rows: Vec<(String, ContentNode)>) -> HashMap<String, Vec<ContentNode>> {
    let mut out: HashMap<String, Vec<ContentNode>> = HashMap::new();
    for (parent, node) in rows {
        out.entry(parent).or_default().push(node);
    }
    out
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, title, description, published, updated_at FROM courses WHERE id = ?",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Course {
            id: row.get("id"),
            metadata: CourseMetadata {
                title: row.get("title"),
                description: row.get("description"),
                published: row.get("published"),
            },
            updated_at: timestamp(row.get("updated_at")),
        }))
    }

    async fn update_course_metadata(&self, course_id: &str, metadata: &CourseMetadata) -> Result<()> {
        let result = sqlx::query(
            "UPDATE courses SET title = ?, description = ?, published = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&metadata.title)
        .bind(&metadata.description)
        .bind(metadata.published)
        .bind(Utc::now().timestamp())
        .bind(course_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("course not found: {}", course_id);
        }
        Ok(())
    }

    async fn fetch_tree(&self, course_id: &str) -> Result<Vec<ContentNode>> {
        let unit_rows = sqlx::query(
            "SELECT u.id, u.lesson_id, u.title, u.sort_position, u.content, u.video_url, u.file_url, u.duration_minutes \
             FROM units u JOIN lessons l ON u.lesson_id = l.id JOIN modules m ON l.module_id = m.id \
             WHERE m.course_id = ? ORDER BY u.sort_position ASC, u.rowid ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load units")?;

        let lesson_rows = sqlx::query(
            "SELECT l.id, l.module_id, l.title, l.sort_position, l.description, l.video_url \
             FROM lessons l JOIN modules m ON l.module_id = m.id \
             WHERE m.course_id = ? ORDER BY l.sort_position ASC, l.rowid ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load lessons")?;

        let module_rows = sqlx::query(
            "SELECT id, title, sort_position, description, image_url FROM modules \
             WHERE course_id = ? ORDER BY sort_position ASC, rowid ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load modules")?;

        let mut units = group_by_parent(
            unit_rows
                .iter()
                .map(|row| {
                    let duration: Option<i64> = row.get("duration_minutes");
                    let body = NodeBody::Unit {
                        content: row.get("content"),
                        video_url: row.get("video_url"),
                        file_url: row.get("file_url"),
                        duration_minutes: duration.map(|d| d.max(0) as u32),
                    };
                    let lesson_id: String = row.get("lesson_id");
                    (lesson_id, node_from_row(row, body))
                })
                .collect(),
        );

        let mut lessons = group_by_parent(
            lesson_rows
                .iter()
                .map(|row| {
                    let body = NodeBody::Lesson {
                        description: row.get("description"),
                        video_url: row.get("video_url"),
                    };
                    let mut node = node_from_row(row, body);
                    if let Some(id) = &node.id {
                        node.children = units.remove(id).unwrap_or_default();
                    }
                    let module_id: String = row.get("module_id");
                    (module_id, node)
                })
                .collect(),
        );

        Ok(module_rows
            .iter()
            .map(|row| {
                let body = NodeBody::Module {
                    description: row.get("description"),
                    image_url: row.get("image_url"),
                };
                let mut node = node_from_row(row, body);
                if let Some(id) = &node.id {
                    node.children = lessons.remove(id).unwrap_or_default();
                }
                node
            })
            .collect())
    }

    async fn create_node(&self, parent_id: &str, draft: &NodeDraft) -> Result<String> {
        let kind = draft.kind();
        if !self.exists(parent_table(kind), parent_id).await? {
            bail!("cannot create {}: parent {} not found", kind, parent_id);
        }

        let id = Uuid::new_v4().to_string();
        let query = match &draft.body {
            NodeBody::Module {
                description,
                image_url,
            } => sqlx::query(
                "INSERT INTO modules (id, course_id, title, sort_position, description, image_url) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(parent_id)
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(description)
            .bind(image_url),
            NodeBody::Lesson {
                description,
                video_url,
            } => sqlx::query(
                "INSERT INTO lessons (id, module_id, title, sort_position, description, video_url) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(parent_id)
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(description)
            .bind(video_url),
            NodeBody::Unit {
                content,
                video_url,
                file_url,
                duration_minutes,
            } => sqlx::query(
                "INSERT INTO units (id, lesson_id, title, sort_position, content, video_url, file_url, duration_minutes) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(parent_id)
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(content)
            .bind(video_url)
            .bind(file_url)
            .bind(duration_minutes.map(i64::from)),
        };
        query.execute(&self.pool).await?;
        debug!(kind = %kind, id = %id, parent = %parent_id, "node created");
        Ok(id)
    }

    async fn update_node(&self, id: &str, draft: &NodeDraft) -> Result<()> {
        let query = match &draft.body {
            NodeBody::Module {
                description,
                image_url,
            } => sqlx::query(
                "UPDATE modules SET title = ?, sort_position = ?, description = ?, image_url = ? WHERE id = ?",
            )
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(description)
            .bind(image_url),
            NodeBody::Lesson {
                description,
                video_url,
            } => sqlx::query(
                "UPDATE lessons SET title = ?, sort_position = ?, description = ?, video_url = ? WHERE id = ?",
            )
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(description)
            .bind(video_url),
            NodeBody::Unit {
                content,
                video_url,
                file_url,
                duration_minutes,
            } => sqlx::query(
                "UPDATE units SET title = ?, sort_position = ?, content = ?, video_url = ?, file_url = ?, duration_minutes = ? WHERE id = ?",
            )
            .bind(&draft.title)
            .bind(draft.sort_position)
            .bind(content)
            .bind(video_url)
            .bind(file_url)
            .bind(duration_minutes.map(i64::from)),
        };
        let result = query.bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            bail!("{} {} not found", draft.kind(), id);
        }
        Ok(())
    }

    async fn delete_nodes(&self, kind: NodeKind, ids: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "DELETE FROM {} WHERE id IN ({})",
                table_for(kind),
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            deleted += query.execute(&self.pool).await?.rows_affected();
        }
        Ok(deleted)
    }

    async fn assignments_for_units(&self, unit_ids: &[String]) -> Result<Vec<Assignment>> {
        let mut out = Vec::new();
        for chunk in unit_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT id, course_id, unit_id, title, deleted FROM assignments \
                 WHERE deleted = 0 AND unit_id IN ({}) ORDER BY rowid ASC",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(&self.pool).await?;
            out.extend(rows.iter().map(assignment_from_row));
        }
        Ok(out)
    }

    async fn assignments_for_course(&self, course_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT id, course_id, unit_id, title, deleted FROM assignments \
             WHERE course_id = ? AND deleted = 0 ORDER BY rowid ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query(
            "SELECT id, course_id, unit_id, title, deleted FROM assignments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(assignment_from_row))
    }

    async fn repoint_assignment(&self, id: &str, unit_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE assignments SET unit_id = ?, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(unit_id)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn try_lock_course(&self, course_id: &str, holder: &str, ttl_secs: i64) -> Result<bool> {
        let now = Utc::now().timestamp();
        // Insert, or take over when re-entrant or expired.
        let result = sqlx::query(
            "INSERT INTO course_locks (course_id, holder, acquired_at) VALUES (?, ?, ?) \
             ON CONFLICT(course_id) DO UPDATE SET holder = excluded.holder, acquired_at = excluded.acquired_at \
             WHERE course_locks.holder = excluded.holder OR course_locks.acquired_at <= ?",
        )
        .bind(course_id)
        .bind(holder)
        .bind(now)
        .bind(now - ttl_secs)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to lock course {}", course_id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlock_course(&self, course_id: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM course_locks WHERE course_id = ? AND holder = ?")
            .bind(course_id)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
