//! # DocVault Core
//!
//! Storage-agnostic logic for DocVault: the App → Document → Chunk → Image
//! data model, the store traits, and the chunk engine that keeps the three
//! lower collections consistent without multi-record transactions.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Backends and the
//! concrete PDF chunker live in the `docvault` application crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `App`, `Document`, `Chunk`, `Image` records |
//! | [`error`] | `VaultError` and its transport classification |
//! | [`access`] | `Actor`, `Grant`, and the `Access` capability |
//! | [`store`] | Async store traits plus in-memory implementations |
//! | [`storage`] | File storage trait for uploaded bytes and app folders |
//! | [`chunk`] | `Chunker` trait, chunk parameters, page splitter |
//! | [`compensation`] | Reverse-order undo log used for manual rollback |
//! | [`lease`] | Per-document mutation leases |
//! | [`app`] | App registry |
//! | [`document`] | Document registry |
//! | [`image`] | Image service |
//! | [`engine`] | Chunk engine: create, delete, bulk, single-chunk ops |

pub mod access;
pub mod app;
pub mod chunk;
pub mod compensation;
pub mod document;
pub mod engine;
pub mod error;
pub mod image;
pub mod lease;
pub mod models;
pub mod storage;
pub mod store;

pub use access::{Access, Actor, Grant};
pub use error::{ErrorKind, VaultError, VaultResult};
