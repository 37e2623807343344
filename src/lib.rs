//! # DB-Sync Merge Engine
//!
//! Row-level merge and conflict resolution for multi-site change
//! replication. Remote sites ship change records (create/update/delete per
//! row, identified by uuid); this crate applies them to the local store
//! under hash-anchored optimistic concurrency.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           dbsync-engine                              │
//! │                                                                      │
//! │  ChangeEnvelope ─► SiteNormalizer ─► reference decode ─► MergeEngine │
//! │      (wire)        (qualify per-     (resolve targets,   (hash check,│
//! │                     site fields)      placeholders)       write)     │
//! │                                                              │       │
//! │                        ┌─────────────┐      ┌────────────┐   │       │
//! │                        │ RecordStore │◄─────┤ HashStore  │◄──┘       │
//! │                        │ (rows)      │      │ (digests)  │           │
//! │                        └─────────────┘      └────────────┘           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Merge rules
//!
//! Every merged record leaves behind a digest of its payload in the
//! [`store::HashStore`]. The next change for the same uuid compares three
//! digests (stored, current local, incoming) to pick one of: plain insert,
//! retry of an interrupted insert, safe replay, clean update, or
//! [`error::SyncError::ConflictDetected`]. Deletes never remove rows; they
//! set void markers and flow through the update path.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbsync_engine::{
//!     ChangeRecord, KindRegistry, MergeEngine, SyncConfig, SyncOperation,
//! };
//! use dbsync_engine::store::{FixedIdentity, InMemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let engine = MergeEngine::new(
//!         SyncConfig::for_testing(),
//!         KindRegistry::with_defaults(),
//!         Arc::clone(&store),
//!         Arc::clone(&store),
//!         Arc::new(FixedIdentity::anonymous()),
//!     )
//!     .expect("valid configuration");
//!
//!     let change = ChangeRecord::new("Person", "p1", SyncOperation::Create, "site-a")
//!         .with_field("gender", "F");
//!     engine.apply(change).await.expect("merge");
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod placeholder;
pub mod reference;
pub mod registry;
pub mod site;
pub mod store;

// Re-exports for convenience
pub use config::SyncConfig;
pub use engine::{Applied, MergeEngine};
pub use error::{Result, SyncError};
pub use model::{
    ChangeEnvelope, ChangeMetadata, ChangeRecord, LocalRecord, RecordHash, SyncOperation,
};
pub use normalize::SiteNormalizer;
pub use placeholder::PlaceholderResolver;
pub use reference::DecodedReference;
pub use registry::{KindRegistry, KindSpec};
pub use site::{SiteInfo, SiteRegistry};
