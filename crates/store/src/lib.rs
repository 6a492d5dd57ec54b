//! Quillgate usage and subscription storage adapters.
//!
//! Implements [`pipeline::UsageStore`] and [`pipeline::SubscriptionStore`]
//! twice: [`MemoryStore`] for tests and single-process deployments, and
//! [`SqliteStore`] for durable state.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. The one
//! guarantee it adds is atomicity: every increment is a single storage-level
//! operation (a per-key entry lock in memory, a single-statement upsert in
//! SQLite), never a read followed by a write.
//!
//! Subscription writes ([`MemoryStore::upsert_subscription`],
//! [`SqliteStore::upsert_subscription`]) belong to the billing side and the
//! admin CLI; the pipeline only reads.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
