//! Shared fixtures for integration tests.

use dbsync_engine::store::{FixedIdentity, InMemoryStore};
use dbsync_engine::{ChangeRecord, KindRegistry, MergeEngine, SyncConfig, SyncOperation};
use std::sync::Arc;

pub type TestEngine = MergeEngine<InMemoryStore, InMemoryStore, FixedIdentity>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine over a fresh in-memory store, anonymous acting user.
pub fn setup() -> (Arc<InMemoryStore>, TestEngine) {
    setup_with_identity(FixedIdentity::anonymous())
}

/// Engine over a fresh in-memory store with the given acting user.
pub fn setup_with_identity(identity: FixedIdentity) -> (Arc<InMemoryStore>, TestEngine) {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let engine = MergeEngine::new(
        SyncConfig::for_testing(),
        KindRegistry::with_defaults(),
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::new(identity),
    )
    .expect("test configuration is valid");
    (store, engine)
}

/// A Person change with a single data field.
pub fn person(uuid: &str, op: SyncOperation, gender: &str) -> ChangeRecord {
    ChangeRecord::new("Person", uuid, op, "site-a").with_field("gender", gender)
}
