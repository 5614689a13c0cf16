//! Request-scoped course tree cache.
//!
//! One [`TreeCache`] lives for one reconciliation (or one HTTP request) and
//! is passed explicitly to whoever needs a tree. There is no process-wide
//! state.
//!
//! Contract:
//! - [`get_or_fetch`](TreeCache::get_or_fetch) returns a cached tree only if
//!   it is younger than the TTL; otherwise it reloads from the store.
//! - Any code that mutates a course must call
//!   [`invalidate`](TreeCache::invalidate) for it before the next read.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::fetch::{fetch_course_tree, CourseTree};
use crate::store::Store;

pub struct TreeCache {
    ttl: Duration,
    entries: HashMap<String, CourseTree>,
    hits: u64,
    misses: u64,
}

impl TreeCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub async fn get_or_fetch(&mut self, store: &dyn Store, course_id: &str) -> Result<CourseTree> {
        if let Some(tree) = self.entries.get(course_id) {
            if Utc::now() - tree.fetched_at < self.ttl {
                self.hits += 1;
                return Ok(tree.clone());
            }
        }
        self.misses += 1;
        let tree = fetch_course_tree(store, course_id).await?;
        self.entries.insert(course_id.to_string(), tree.clone());
        Ok(tree)
    }

    pub fn invalidate(&mut self, course_id: &str) {
        self.entries.remove(course_id);
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
