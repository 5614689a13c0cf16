//! # Course Reconciler
//!
//! Saves edited course outlines (modules → lessons → units) without losing
//! the quiz assignments attached to units.
//!
//! The reconciliation engine lives in [`course_reconciler_core`]; this crate
//! adds SQLite persistence, TOML configuration, the `courserec` CLI and an
//! HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │   CLI    │──▶│  Reconciler (core)           │──▶│  SQLite  │
//! │ HTTP API │   │  snapshot → rebuild → restore │   │  Store   │
//! └──────────┘   └──────────────────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! courserec init
//! courserec course create --id c1 --title "Rust 101"
//! courserec course show c1 --json > outline.json
//! # edit outline.json
//! courserec reconcile c1 --file outline.json --strategy incremental
//! courserec validate c1
//! courserec serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`course_cmd`] | Course and assignment bookkeeping commands |
//! | [`reconcile_cmd`] | Reconcile and validate commands |
//! | [`server`] | HTTP server |

pub mod config;
pub mod course_cmd;
pub mod db;
pub mod migrate;
pub mod reconcile_cmd;
pub mod server;
pub mod sqlite_store;
