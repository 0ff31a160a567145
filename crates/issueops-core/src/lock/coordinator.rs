//! Lock acquisition and release rules on top of a [`LockStore`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{CreateOutcome, DeleteOutcome, LockStore};
use super::{LockError, LockRecord, LockScope};

/// Parameters of a lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub environment: String,
    pub holder: String,
    pub reason: Option<String>,
    pub sticky: bool,
    pub global: bool,
    pub link: Option<String>,
}

impl LockRequest {
    /// Non-sticky lock owned by a single deployment.
    pub fn deploy(environment: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            holder: holder.into(),
            reason: None,
            sticky: false,
            global: false,
            link: None,
        }
    }

    pub fn scope(&self) -> LockScope {
        if self.global {
            LockScope::Global
        } else {
            LockScope::Environment(self.environment.clone())
        }
    }

    pub fn to_record(&self) -> LockRecord {
        LockRecord::new(&self.scope(), self.holder.clone())
            .with_reason(self.reason.clone())
            .with_sticky(self.sticky)
            .with_link(self.link.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `fresh` is false when a lock of the same holder was already in place.
    Acquired { record: LockRecord, fresh: bool },
    /// Another holder's lock covers the requested scope.
    Denied(LockRecord),
    /// Another run won the create, and its lock was gone again before it
    /// could be read back.
    Lost(LockScope),
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(LockRecord),
    NotHeld,
    /// Sticky lock of another holder, released only with `force`
    Forbidden(LockRecord),
}

/// Enforces ownership, stickiness and global dominance.
///
/// Holds no lock state of its own; every decision re-reads the store.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Record stored under exactly `scope`.
    pub async fn check_status(&self, scope: &LockScope) -> Result<Option<LockRecord>, LockError> {
        Ok(self.store.read(scope).await?.map(|stored| stored.record))
    }

    /// Lock that currently blocks `environment`: the global lock first, then
    /// the environment's own.
    pub async fn covering_lock(&self, environment: &str) -> Result<Option<LockRecord>, LockError> {
        if let Some(global) = self.check_status(&LockScope::Global).await? {
            return Ok(Some(global));
        }
        self.check_status(&LockScope::environment(environment))
            .await
    }

    pub async fn acquire(&self, request: &LockRequest) -> Result<AcquireOutcome, LockError> {
        let scope = request.scope();

        if !scope.is_global() {
            if let Some(global) = self.store.read(&LockScope::Global).await? {
                if !global.record.is_held_by(&request.holder) {
                    debug!(environment = %request.environment, holder = %global.record.holder, "global lock blocks acquire");
                    return Ok(AcquireOutcome::Denied(global.record));
                }
                return Ok(AcquireOutcome::Acquired {
                    record: global.record,
                    fresh: false,
                });
            }
        }

        let created = match self.store.create(&request.to_record()).await? {
            CreateOutcome::Created(stored) => stored,
            CreateOutcome::Exists(Some(existing)) => {
                if existing.record.is_held_by(&request.holder) {
                    debug!(lock = %scope, holder = %request.holder, "adopting existing lock");
                    return Ok(AcquireOutcome::Acquired {
                        record: existing.record,
                        fresh: false,
                    });
                }
                info!(lock = %scope, holder = %existing.record.holder, "lock held by another holder");
                return Ok(AcquireOutcome::Denied(existing.record));
            }
            CreateOutcome::Exists(None) => {
                info!(lock = %scope, "lost create race to a lock that is already gone");
                return Ok(AcquireOutcome::Lost(scope));
            }
        };

        if !scope.is_global() {
            // A global lock may have been created between the first read and
            // our create.
            let global = match self.store.read(&LockScope::Global).await {
                Ok(global) => global,
                Err(e) => {
                    if let Err(rollback) = self.store.delete(&scope, &created.version).await {
                        warn!(lock = %scope, error = %rollback, "failed to roll back lock");
                    }
                    return Err(e.into());
                }
            };
            if let Some(global) = global.filter(|g| !g.record.is_held_by(&request.holder)) {
                self.store.delete(&scope, &created.version).await?;
                info!(lock = %scope, holder = %global.record.holder, "global lock won the race, rolled back");
                return Ok(AcquireOutcome::Denied(global.record));
            }
        }

        info!(lock = %scope, holder = %request.holder, sticky = request.sticky, "lock acquired");
        Ok(AcquireOutcome::Acquired {
            record: created.record,
            fresh: true,
        })
    }

    /// Explicit release. `force` allows removing another holder's sticky lock.
    pub async fn release(
        &self,
        scope: &LockScope,
        holder: &str,
        force: bool,
    ) -> Result<ReleaseOutcome, LockError> {
        let Some(stored) = self.store.read(scope).await? else {
            return Ok(ReleaseOutcome::NotHeld);
        };

        if !stored.record.is_held_by(holder) && stored.record.sticky && !force {
            return Ok(ReleaseOutcome::Forbidden(stored.record));
        }

        self.delete(scope, stored.record, &stored.version).await
    }

    /// Teardown release: removes only a non-sticky lock held by `holder`.
    pub async fn release_own(
        &self,
        scope: &LockScope,
        holder: &str,
    ) -> Result<ReleaseOutcome, LockError> {
        match self.store.read(scope).await? {
            Some(stored) if stored.record.is_held_by(holder) && !stored.record.sticky => {
                self.delete(scope, stored.record, &stored.version).await
            }
            _ => Ok(ReleaseOutcome::NotHeld),
        }
    }

    async fn delete(
        &self,
        scope: &LockScope,
        record: LockRecord,
        version: &str,
    ) -> Result<ReleaseOutcome, LockError> {
        match self.store.delete(scope, version).await? {
            DeleteOutcome::Deleted => {
                info!(lock = %scope, holder = %record.holder, "lock released");
                Ok(ReleaseOutcome::Released(record))
            }
            DeleteOutcome::Missing => Ok(ReleaseOutcome::NotHeld),
            DeleteOutcome::Changed => Err(LockError::Contended(scope.to_string())),
        }
    }
}
