//! Sibling matching for one tree level.
//!
//! Pairs each submitted node with at most one persisted sibling:
//!
//! 1. Identity: the submitted node carries an id present among the persisted
//!    siblings. Resolved for every submitted node before any title fallback,
//!    so a title match can never steal a node another submission claims by id.
//! 2. Title: the first unclaimed persisted sibling, in persisted order, whose
//!    trimmed lowercase title equals the submitted one.
//! 3. Otherwise the submitted node is new.
//!
//! Persisted siblings left over are reported in [`SiblingMatch::unmatched`];
//! what happens to them is the caller's policy.

use std::collections::HashMap;

use crate::models::ContentNode;

/// How a submitted node was paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Identity(usize),
    Title(usize),
    New,
}

impl MatchKind {
    pub fn persisted_index(self) -> Option<usize> {
        match self {
            MatchKind::Identity(i) | MatchKind::Title(i) => Some(i),
            MatchKind::New => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingMatch {
    /// One entry per submitted node, in submission order.
    pub pairs: Vec<MatchKind>,
    /// Persisted indices nobody claimed, in persisted order.
    pub unmatched: Vec<usize>,
}

impl SiblingMatch {
    pub fn created(&self) -> usize {
        self.pairs.iter().filter(|p| **p == MatchKind::New).count()
    }
}

pub fn match_siblings(persisted: &[ContentNode], submitted: &[ContentNode]) -> SiblingMatch {
    let mut claimed = vec![false; persisted.len()];
    let mut pairs = vec![MatchKind::New; submitted.len()];

    let by_id: HashMap<&str, usize> = persisted
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.id.as_deref().map(|id| (id, i)))
        .collect();

    for (s_idx, node) in submitted.iter().enumerate() {
        let Some(id) = node.id.as_deref() else {
            continue;
        };
        if let Some(&p_idx) = by_id.get(id) {
            if !claimed[p_idx] {
                claimed[p_idx] = true;
                pairs[s_idx] = MatchKind::Identity(p_idx);
            }
        }
    }

    let persisted_keys: Vec<String> = persisted.iter().map(ContentNode::match_key).collect();
    for (s_idx, node) in submitted.iter().enumerate() {
        if pairs[s_idx] != MatchKind::New {
            continue;
        }
        let key = node.match_key();
        if let Some(p_idx) = (0..persisted.len()).find(|&i| !claimed[i] && persisted_keys[i] == key) {
            claimed[p_idx] = true;
            pairs[s_idx] = MatchKind::Title(p_idx);
        }
    }

    let unmatched = claimed
        .iter()
        .enumerate()
        .filter_map(|(i, c)| (!c).then_some(i))
        .collect();

    SiblingMatch { pairs, unmatched }
}
