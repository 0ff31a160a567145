//! Lock store on a local repository's ref database.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{ErrorCode, Repository, Signature};
use tracing::debug;

use super::store::{CreateOutcome, DeleteOutcome, LockStore};
use super::{LOCK_FILE, LockRecord, LockScope, LockStoreError, StoredLock};

const COMMITTER_NAME: &str = "issueops";
const COMMITTER_EMAIL: &str = "issueops@users.noreply.github.com";

/// Stores locks as branches of a local git repository.
///
/// libgit2 writes refs through lock files, so a second create of the same
/// ref fails with `Exists` (or `Locked` while another writer is mid-update).
#[derive(Debug, Clone)]
pub struct GitRefLockStore {
    repo_path: PathBuf,
}

impl GitRefLockStore {
    /// Open a store on an existing repository.
    pub fn open(repo_path: &Path) -> Result<Self, LockStoreError> {
        Repository::open(repo_path)?;
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T, LockStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T, LockStoreError> + Send + 'static,
    {
        let path = self.repo_path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&path)?;
            f(&repo)
        })
        .await?
    }
}

#[async_trait]
impl LockStore for GitRefLockStore {
    async fn read(&self, scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError> {
        let scope = scope.clone();
        self.with_repo(move |repo| read_lock(repo, &scope)).await
    }

    async fn create(&self, record: &LockRecord) -> Result<CreateOutcome, LockStoreError> {
        let record = record.clone();
        self.with_repo(move |repo| create_lock(repo, &record)).await
    }

    async fn delete(
        &self,
        scope: &LockScope,
        version: &str,
    ) -> Result<DeleteOutcome, LockStoreError> {
        let scope = scope.clone();
        let version = version.to_string();
        self.with_repo(move |repo| delete_lock(repo, &scope, &version))
            .await
    }
}

fn read_lock(repo: &Repository, scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError> {
    let reference = match repo.find_reference(&scope.ref_name()) {
        Ok(reference) => reference,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let commit = reference.peel_to_commit()?;
    let tree = commit.tree()?;
    let entry = tree
        .get_name(LOCK_FILE)
        .ok_or_else(|| LockStoreError::Corrupt {
            key: scope.branch_name(),
            reason: format!("{} is missing", LOCK_FILE),
        })?;
    let blob = repo.find_blob(entry.id())?;
    let record: LockRecord =
        serde_json::from_slice(blob.content()).map_err(|e| LockStoreError::Corrupt {
            key: scope.branch_name(),
            reason: e.to_string(),
        })?;

    Ok(Some(StoredLock {
        record,
        version: commit.id().to_string(),
    }))
}

fn create_lock(repo: &Repository, record: &LockRecord) -> Result<CreateOutcome, LockStoreError> {
    let scope = record.scope();
    let content = serde_json::to_vec_pretty(record).map_err(|e| LockStoreError::Corrupt {
        key: scope.branch_name(),
        reason: e.to_string(),
    })?;

    let blob = repo.blob(&content)?;
    let mut builder = repo.treebuilder(None)?;
    builder.insert(LOCK_FILE, blob, 0o100644)?;
    let tree = repo.find_tree(builder.write()?)?;

    let signature = Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)?;
    let message = format!("lock {} for {}", scope, record.holder);
    let commit = repo.commit(None, &signature, &signature, &message, &tree, &[])?;

    match repo.reference(&scope.ref_name(), commit, false, &message) {
        Ok(_) => {
            debug!(lock = %scope.branch_name(), version = %commit, "created lock ref");
            Ok(CreateOutcome::Created(StoredLock {
                record: record.clone(),
                version: commit.to_string(),
            }))
        }
        Err(e) if matches!(e.code(), ErrorCode::Exists | ErrorCode::Locked) => {
            debug!(lock = %scope.branch_name(), "lock ref already exists");
            Ok(CreateOutcome::Exists(read_lock(repo, &scope)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn delete_lock(
    repo: &Repository,
    scope: &LockScope,
    version: &str,
) -> Result<DeleteOutcome, LockStoreError> {
    let ref_name = scope.ref_name();
    match repo.find_reference(&ref_name) {
        Ok(_) => {}
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(DeleteOutcome::Missing),
        Err(e) => return Err(e.into()),
    }

    // Hold the ref lock across compare and remove.
    let mut transaction = repo.transaction()?;
    transaction.lock_ref(&ref_name)?;

    let current = match repo.find_reference(&ref_name) {
        Ok(reference) => reference.target(),
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(DeleteOutcome::Missing),
        Err(e) => return Err(e.into()),
    };
    if current.map(|oid| oid.to_string()).as_deref() != Some(version) {
        return Ok(DeleteOutcome::Changed);
    }

    transaction.remove(&ref_name)?;
    transaction.commit()?;
    debug!(lock = %scope.branch_name(), version, "deleted lock ref");
    Ok(DeleteOutcome::Deleted)
}
