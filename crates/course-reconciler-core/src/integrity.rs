//! Post-reconciliation integrity scoring.
//!
//! Scans a course tree for duplicate sibling titles, assignments pointing at
//! units that no longer exist, and empty containers. Produces an advisory
//! score in `[0, 100]`; the score never blocks a save.
//!
//! # Scoring
//!
//! | Finding | Penalty |
//! |---------|---------|
//! | Any duplicate module titles | 30 (once) |
//! | Module with duplicate lesson titles | 10 per module |
//! | Lesson with duplicate unit titles | 5 per lesson |
//! | Any orphaned assignment | 20 (once) |
//! | Empty module / lesson | 0 (reported only) |

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::fetch::CourseTree;
use crate::models::{Assignment, ContentNode};
use crate::store::Store;

pub const DUPLICATE_MODULE_PENALTY: u32 = 30;
pub const DUPLICATE_LESSON_PENALTY: u32 = 10;
pub const DUPLICATE_UNIT_PENALTY: u32 = 5;
pub const ORPHAN_PENALTY: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateModuleTitle,
    DuplicateLessonTitle,
    DuplicateUnitTitle,
    OrphanedAssignment,
    EmptyModule,
    EmptyLesson,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityIssue {
    pub kind: IssueKind,
    pub message: String,
    /// Points this issue took off the score. Penalties charged once per
    /// course are attributed to the first issue of their kind.
    pub penalty: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub score: u8,
    /// Live assignments checked for orphans.
    pub assignments_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Messages for issues that cost points.
    pub fn warnings(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| !matches!(i.kind, IssueKind::EmptyModule | IssueKind::EmptyLesson))
            .map(|i| i.message.clone())
            .collect()
    }
}

/// Score a loaded course tree against every live assignment of the course.
///
/// Assignments are read course-wide rather than taken from `tree`, so ones
/// pointing at units that no longer exist are counted as orphans.
pub async fn validate(store: &dyn Store, tree: &CourseTree) -> Result<IntegrityReport> {
    let assignments = store
        .assignments_for_course(&tree.course_id)
        .await
        .with_context(|| format!("failed to load assignments of course {}", tree.course_id))?;
    Ok(score_tree(&tree.modules, &assignments))
}

/// Score an already loaded tree.
pub fn score_tree(modules: &[ContentNode], assignments: &[Assignment]) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut penalty: u32 = 0;

    let dup_modules = duplicate_titles(modules);
    for (i, title) in dup_modules.iter().enumerate() {
        let p = if i == 0 { DUPLICATE_MODULE_PENALTY } else { 0 };
        issues.push(IntegrityIssue {
            kind: IssueKind::DuplicateModuleTitle,
            message: format!("duplicate module title '{}'", title),
            penalty: p,
        });
        penalty += p;
    }

    let mut unit_ids: HashSet<&str> = HashSet::new();

    for module in modules {
        if module.children.is_empty() {
            issues.push(IntegrityIssue {
                kind: IssueKind::EmptyModule,
                message: format!("module '{}' has no lessons", module.title),
                penalty: 0,
            });
        }

        let dup_lessons = duplicate_titles(&module.children);
        if !dup_lessons.is_empty() {
            issues.push(IntegrityIssue {
                kind: IssueKind::DuplicateLessonTitle,
                message: format!(
                    "module '{}' has duplicate lesson titles: {}",
                    module.title,
                    dup_lessons.join(", ")
                ),
                penalty: DUPLICATE_LESSON_PENALTY,
            });
            penalty += DUPLICATE_LESSON_PENALTY;
        }

        for lesson in &module.children {
            if lesson.children.is_empty() {
                issues.push(IntegrityIssue {
                    kind: IssueKind::EmptyLesson,
                    message: format!(
                        "lesson '{} : {}' has no units",
                        module.title, lesson.title
                    ),
                    penalty: 0,
                });
            }

            let dup_units = duplicate_titles(&lesson.children);
            if !dup_units.is_empty() {
                issues.push(IntegrityIssue {
                    kind: IssueKind::DuplicateUnitTitle,
                    message: format!(
                        "lesson '{} : {}' has duplicate unit titles: {}",
                        module.title,
                        lesson.title,
                        dup_units.join(", ")
                    ),
                    penalty: DUPLICATE_UNIT_PENALTY,
                });
                penalty += DUPLICATE_UNIT_PENALTY;
            }

            unit_ids.extend(lesson.children.iter().filter_map(|u| u.id.as_deref()));
        }
    }

    let mut first_orphan = true;
    for a in assignments
        .iter()
        .filter(|a| !a.deleted && !unit_ids.contains(a.unit_id.as_str()))
    {
        let p = if first_orphan { ORPHAN_PENALTY } else { 0 };
        first_orphan = false;
        issues.push(IntegrityIssue {
            kind: IssueKind::OrphanedAssignment,
            message: format!(
                "assignment '{}' ({}) points to missing unit {}",
                a.title, a.id, a.unit_id
            ),
            penalty: p,
        });
        penalty += p;
    }

    IntegrityReport {
        score: 100u32.saturating_sub(penalty) as u8,
        assignments_checked: assignments.iter().filter(|a| !a.deleted).count(),
        issues,
    }
}

/// Titles appearing more than once among siblings (trimmed, case-insensitive),
/// in order of first appearance, rendered as first written.
fn duplicate_titles(siblings: &[ContentNode]) -> Vec<String> {
    let mut seen: HashMap<String, (usize, &str)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for node in siblings {
        let key = node.match_key();
        let entry = seen.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (0, node.title.as_str())
        });
        entry.0 += 1;
    }
    order
        .into_iter()
        .filter_map(|key| match seen.get(&key) {
            Some((n, title)) if *n > 1 => Some(title.to_string()),
            _ => None,
        })
        .collect()
}
