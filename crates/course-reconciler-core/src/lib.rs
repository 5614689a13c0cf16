//! # Course Reconciler Core
//!
//! Runtime-agnostic logic for saving a course outline (modules → lessons →
//! units) without destroying data the editor does not know about and without
//! orphaning quiz assignments that point at units.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Persistence is
//! reached exclusively through the [`store::Store`] trait.
//!
//! ## Pipeline
//!
//! ```text
//! submitted tree
//!      │
//!      ▼
//! ┌───────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌───────────┐
//! │ fetch +   │──▶│ snapshot │──▶│ rebuild │──▶│ restore │──▶│ integrity │
//! │ prevalid. │   │ (assign.)│   │ (tree)  │   │ (assign)│   │ (score)   │
//! └───────────┘   └──────────┘   └─────────┘   └─────────┘   └───────────┘
//!                                                                  │
//!                                                                  ▼
//!                                                     ReconciliationResult
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `ContentNode`, `NodeBody`, `Assignment`, `TitlePath` |
//! | [`store`] | `Store` trait and the in-memory implementation |
//! | [`fetch`] | Load a course tree and compute its version fingerprint |
//! | [`cache`] | Request-scoped tree cache with TTL and invalidation |
//! | [`matcher`] | Identity-first, title-fallback sibling pairing |
//! | [`snapshot`] | Capture assignments with their title paths |
//! | [`rebuild`] | Destructive and incremental content rebuild |
//! | [`restore`] | Re-point assignments after a rebuild |
//! | [`integrity`] | 0–100 advisory integrity score |
//! | [`orchestrator`] | Phase sequencing, locking and compensation |
//! | [`result`] | `ReconciliationResult` and phase timings |
//! | [`error`] | `ReconcileError` |

pub mod cache;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod rebuild;
pub mod restore;
pub mod result;
pub mod snapshot;
pub mod store;

pub use error::ReconcileError;
pub use models::{Assignment, ContentNode, CourseMetadata, NodeBody, NodeKind, Strategy, TitlePath};
pub use orchestrator::{ReconcileOptions, ReconcileRequest, Reconciler};
pub use result::ReconciliationResult;
pub use store::Store;

#[cfg(test)]
pub(crate) mod testutil;
