//! Content rebuild strategies.
//!
//! Both strategies write modules first, then each module's lessons, then each
//! lesson's units, always in submission order and always with
//! `sort_position` equal to the node's index within its parent. Distinct
//! modules are independent subtrees and are processed concurrently, up to
//! `fan_out` at a time; writes inside one module stay sequential.
//!
//! - [`Strategy::Destructive`]: delete every unit, lesson and module of the
//!   course, then insert the submission fresh. Every node gets a new id.
//! - [`Strategy::Incremental`]: match each level with
//!   [`match_siblings`](crate::matcher::match_siblings), patch matched nodes in
//!   place, create the unmatched submissions, and keep unmatched persisted
//!   nodes. Kept nodes are moved after the submitted siblings so positions
//!   stay contiguous; nothing else about them changes.

use anyhow::{anyhow, Context, Result};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::matcher::match_siblings;
use crate::models::{ContentNode, NodeKind, Strategy};
use crate::result::NodeCounts;
use crate::store::Store;

/// Children still to be reconciled under a node written at the level above.
struct ChildWork<'n> {
    parent_id: String,
    persisted: &'n [ContentNode],
    submitted: &'n [ContentNode],
}

pub struct Rebuilder<'a> {
    store: &'a dyn Store,
    fan_out: usize,
}

impl<'a> Rebuilder<'a> {
    pub fn new(store: &'a dyn Store, fan_out: usize) -> Self {
        Self {
            store,
            fan_out: fan_out.max(1),
        }
    }

    /// Replace the outline of `course_id`.
    ///
    /// `persisted` must be the course's current outline as returned by
    /// [`Store::fetch_tree`].
    pub async fn rebuild(
        &self,
        course_id: &str,
        persisted: &[ContentNode],
        submitted: &[ContentNode],
        strategy: Strategy,
    ) -> Result<NodeCounts> {
        let counts = match strategy {
            Strategy::Destructive => self.destructive(course_id, persisted, submitted).await?,
            Strategy::Incremental => self.incremental(course_id, persisted, submitted).await?,
        };
        info!(
            course = %course_id,
            %strategy,
            created = counts.created,
            updated = counts.updated,
            unchanged = counts.unchanged,
            preserved = counts.preserved,
            deleted = counts.deleted,
            "content replaced"
        );
        Ok(counts)
    }

    async fn destructive(
        &self,
        course_id: &str,
        persisted: &[ContentNode],
        submitted: &[ContentNode],
    ) -> Result<NodeCounts> {
        let mut counts = NodeCounts::default();

        let module_ids: Vec<String> = persisted.iter().filter_map(|m| m.id.clone()).collect();
        let lesson_ids: Vec<String> = persisted
            .iter()
            .flat_map(|m| m.children.iter())
            .filter_map(|l| l.id.clone())
            .collect();
        let unit_ids: Vec<String> = persisted
            .iter()
            .flat_map(|m| m.children.iter())
            .flat_map(|l| l.children.iter())
            .filter_map(|u| u.id.clone())
            .collect();

        for (kind, ids) in [
            (NodeKind::Unit, &unit_ids),
            (NodeKind::Lesson, &lesson_ids),
            (NodeKind::Module, &module_ids),
        ] {
            if ids.is_empty() {
                continue;
            }
            let removed = self
                .store
                .delete_nodes(kind, ids)
                .await
                .with_context(|| format!("delete {} {}s", ids.len(), kind))?;
            debug!(course = %course_id, %kind, removed, "deleted");
            counts.deleted += removed as usize;
        }

        counts += self.incremental(course_id, &[], submitted).await?;
        Ok(counts)
    }

    async fn incremental(
        &self,
        course_id: &str,
        persisted: &[ContentNode],
        submitted: &[ContentNode],
    ) -> Result<NodeCounts> {
        let (mut counts, work) = self.write_level(course_id, persisted, submitted).await?;

        // Collected before streaming so the future stays `Send`.
        let pending: Vec<BoxFuture<'_, Result<NodeCounts>>> = work
            .into_iter()
            .map(|w| self.reconcile_children(w))
            .collect();
        let per_module: Vec<NodeCounts> = stream::iter(pending)
            .buffer_unordered(self.fan_out)
            .try_collect()
            .await?;
        for c in per_module {
            counts += c;
        }
        Ok(counts)
    }

    /// Reconcile everything below one written node, depth first.
    fn reconcile_children<'s>(&'s self, work: ChildWork<'s>) -> BoxFuture<'s, Result<NodeCounts>> {
        async move {
            let (mut counts, below) = self
                .write_level(&work.parent_id, work.persisted, work.submitted)
                .await?;
            for w in below {
                counts += self.reconcile_children(w).await?;
            }
            Ok(counts)
        }
        .boxed()
    }

    /// Write one sibling level under `parent_id` and return the child levels
    /// still to do, in submission order.
    async fn write_level<'n>(
        &self,
        parent_id: &str,
        persisted: &'n [ContentNode],
        submitted: &'n [ContentNode],
    ) -> Result<(NodeCounts, Vec<ChildWork<'n>>)> {
        let mut counts = NodeCounts::default();
        let mut work = Vec::new();
        let matched = match_siblings(persisted, submitted);

        for (idx, (node, pairing)) in submitted.iter().zip(matched.pairs.iter()).enumerate() {
            let draft = node.draft(idx as i64);
            let (id, persisted_children) = match pairing.persisted_index() {
                Some(p_idx) => {
                    let existing = &persisted[p_idx];
                    let id = existing
                        .id
                        .clone()
                        .ok_or_else(|| anyhow!("persisted {} '{}' has no id", existing.kind(), existing.title))?;
                    if existing.matches_draft(&draft) {
                        counts.unchanged += 1;
                    } else {
                        self.store
                            .update_node(&id, &draft)
                            .await
                            .with_context(|| format!("update {} '{}'", draft.kind(), draft.title))?;
                        counts.updated += 1;
                    }
                    (id, existing.children.as_slice())
                }
                None => {
                    let id = self
                        .store
                        .create_node(parent_id, &draft)
                        .await
                        .with_context(|| format!("create {} '{}'", draft.kind(), draft.title))?;
                    counts.created += 1;
                    (id, &[][..])
                }
            };

            if node.kind().child_kind().is_some() {
                work.push(ChildWork {
                    parent_id: id,
                    persisted: persisted_children,
                    submitted: &node.children,
                });
            }
        }

        let mut next_position = submitted.len() as i64;
        for p_idx in matched.unmatched {
            let kept = &persisted[p_idx];
            counts.preserved += kept.subtree_len();
            if kept.sort_position != next_position {
                let id = kept
                    .id
                    .as_deref()
                    .ok_or_else(|| anyhow!("persisted {} '{}' has no id", kept.kind(), kept.title))?;
                self.store
                    .update_node(id, &kept.draft(next_position))
                    .await
                    .with_context(|| format!("reposition kept {} '{}'", kept.kind(), kept.title))?;
            }
            next_position += 1;
        }

        Ok((counts, work))
    }
}
