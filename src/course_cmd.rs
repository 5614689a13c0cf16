//! Course and assignment bookkeeping commands.
//!
//! `course create` / `assignment add` play the roles of the course catalogue
//! and the quiz subsystem so a database can be seeded from the CLI.
//! `course show --json` emits the submission document accepted by
//! `courserec reconcile`, so an outline can be exported, edited and saved.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use course_reconciler_core::fetch::{fetch_course_tree, unit_paths};
use course_reconciler_core::{Assignment, ContentNode, CourseMetadata, Store};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Course document as exchanged with the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDocument {
    pub course_id: String,
    pub metadata: CourseMetadata,
    /// Fingerprint of `tree` at export time.
    pub version: String,
    pub tree: Vec<ContentNode>,
}

pub async fn load_document(store: &SqliteStore, course_id: &str) -> Result<CourseDocument> {
    let Some(course) = store.get_course(course_id).await? else {
        bail!("course not found: {}", course_id);
    };
    let tree = fetch_course_tree(store, course_id).await?;
    Ok(CourseDocument {
        course_id: course.id,
        metadata: course.metadata,
        version: tree.version,
        tree: tree.modules,
    })
}

pub async fn run_course_create(
    config: &Config,
    id: Option<String>,
    title: &str,
    description: Option<String>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("course title must not be empty");
    }
    let store = SqliteStore::open(config).await?;
    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let metadata = CourseMetadata {
        title: title.to_string(),
        description,
        published: false,
    };
    let result = store.insert_course(&id, &metadata).await;
    store.close().await;
    result?;

    println!("Created course {} ({})", id, title);
    Ok(())
}

pub async fn run_course_show(config: &Config, course_id: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let doc = load_document(&store, course_id).await;
    let assignments = store.assignments_for_course(course_id).await;
    store.close().await;
    let doc = doc?;
    let assignments = assignments?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Course ---");
    println!("id:          {}", doc.course_id);
    println!("title:       {}", doc.metadata.title);
    if let Some(desc) = &doc.metadata.description {
        println!("description: {}", desc);
    }
    println!("published:   {}", doc.metadata.published);
    println!("version:     {}", doc.version);
    println!();
    println!("--- Outline ---");
    for m in &doc.tree {
        println!("{}  [{}]", m.title, m.id.as_deref().unwrap_or("-"));
        for l in &m.children {
            println!("  {}  [{}]", l.title, l.id.as_deref().unwrap_or("-"));
            for u in &l.children {
                let attached = assignments
                    .iter()
                    .filter(|a| Some(a.unit_id.as_str()) == u.id.as_deref())
                    .count();
                if attached > 0 {
                    println!(
                        "    {}  [{}]  ({} assignment(s))",
                        u.title,
                        u.id.as_deref().unwrap_or("-"),
                        attached
                    );
                } else {
                    println!("    {}  [{}]", u.title, u.id.as_deref().unwrap_or("-"));
                }
            }
        }
    }
    Ok(())
}

pub async fn run_assignment_add(
    config: &Config,
    course_id: &str,
    unit_id: &str,
    title: &str,
    id: Option<String>,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let tree = store.fetch_tree(course_id).await;
    let tree = match tree {
        Ok(t) => t,
        Err(e) => {
            store.close().await;
            return Err(e);
        }
    };
    if !unit_paths(&tree).contains_key(unit_id) {
        store.close().await;
        bail!("unit {} not found in course {}", unit_id, course_id);
    }

    let assignment = Assignment {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        course_id: course_id.to_string(),
        unit_id: unit_id.to_string(),
        title: title.to_string(),
        deleted: false,
    };
    let result = store.insert_assignment(&assignment).await;
    store.close().await;
    result?;

    println!("Added assignment {} to unit {}", assignment.id, unit_id);
    Ok(())
}

pub async fn run_assignment_list(config: &Config, course_id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let tree = store.fetch_tree(course_id).await;
    let assignments = store.assignments_for_course(course_id).await;
    store.close().await;
    let paths = unit_paths(&tree?);
    let assignments = assignments?;

    if assignments.is_empty() {
        println!("No assignments.");
        return Ok(());
    }
    for a in &assignments {
        match paths.get(&a.unit_id) {
            Some(path) => println!("{}  {}  -> {}", a.id, a.title, path),
            None => println!("{}  {}  -> (orphaned: unit {})", a.id, a.title, a.unit_id),
        }
    }
    Ok(())
}
