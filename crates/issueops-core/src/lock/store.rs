//! Storage port for lock records.

use async_trait::async_trait;

use super::{LockRecord, LockScope, LockStoreError, StoredLock};

/// Result of an atomic create-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The ref did not exist and now holds the record
    Created(StoredLock),
    /// The ref already existed. Carries the record found there, or `None`
    /// when it disappeared again before it could be read.
    Exists(Option<StoredLock>),
}

/// Result of a delete-if-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete
    Missing,
    /// The ref moved to another version; nothing was deleted
    Changed,
}

/// Durable lock records keyed by [`LockScope`].
///
/// Implementations must resolve create races in the backing store, never
/// with a client-side check-then-act.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn read(&self, scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError>;

    async fn create(&self, record: &LockRecord) -> Result<CreateOutcome, LockStoreError>;

    async fn delete(
        &self,
        scope: &LockScope,
        version: &str,
    ) -> Result<DeleteOutcome, LockStoreError>;
}
