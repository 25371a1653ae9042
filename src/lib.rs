//! # DocVault
//!
//! Apps own uploaded documents; PDF documents are cut into page-level chunks
//! with their embedded images extracted alongside. Chunk creation and
//! deletion span several collections without transactions, so the engine in
//! [`docvault_core::engine`] keeps an undo log and rolls back on failure.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │   CLI    │──▶│ Vault (services + engine) │──▶│  SQLite   │
//! │(docvault)│   │      docvault-core        │   │ + data dir│
//! └──────────┘   └──────────────────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite store implementations |
//! | [`files`] | On-disk file storage |
//! | [`pdf`] | PDF chunker |
//! | [`vault`] | Service wiring and app cascade |

pub mod config;
pub mod db;
pub mod files;
pub mod logging;
pub mod migrate;
pub mod pdf;
pub mod sqlite_store;
pub mod vault;

pub use docvault_core;
