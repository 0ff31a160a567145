#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;

use issueops_core::gates::{
    CommentApi, DeployApi, DeploymentCreated, DeploymentRequest, DeploymentState,
    PermissionVerdict, PermissionsGate, PrecheckGate, PrecheckResult,
};
use issueops_core::lock::{
    CreateOutcome, DeleteOutcome, LockRecord, LockScope, LockStore, LockStoreError, StoredLock,
};
use issueops_core::prelude::*;

/// Lock store on a mutex-guarded map. Create and delete hold the mutex for
/// the whole compare and write, like a ref database does.
#[derive(Default)]
pub struct MemoryLockStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    locks: HashMap<String, StoredLock>,
    next_version: u64,
}

impl MemoryLockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, scope: &LockScope) -> Option<LockRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .locks
            .get(&scope.branch_name())
            .map(|stored| stored.record.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().locks.len()
    }

    /// Place a record directly, bypassing the coordinator.
    pub fn insert(&self, record: LockRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_version += 1;
        let version = inner.next_version.to_string();
        inner
            .locks
            .insert(record.scope().branch_name(), StoredLock { record, version });
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn read(&self, scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.locks.get(&scope.branch_name()).cloned())
    }

    async fn create(&self, record: &LockRecord) -> Result<CreateOutcome, LockStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = record.scope().branch_name();
        if let Some(existing) = inner.locks.get(&key) {
            return Ok(CreateOutcome::Exists(Some(existing.clone())));
        }
        inner.next_version += 1;
        let stored = StoredLock {
            record: record.clone(),
            version: inner.next_version.to_string(),
        };
        inner.locks.insert(key, stored.clone());
        Ok(CreateOutcome::Created(stored))
    }

    async fn delete(
        &self,
        scope: &LockScope,
        version: &str,
    ) -> Result<DeleteOutcome, LockStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = scope.branch_name();
        match inner.locks.get(&key) {
            None => Ok(DeleteOutcome::Missing),
            Some(stored) if stored.version != version => Ok(DeleteOutcome::Changed),
            Some(_) => {
                inner.locks.remove(&key);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

/// A store where every create loses to a lock that is released before it
/// can be read back.
pub struct VanishingLockStore;

impl VanishingLockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl LockStore for VanishingLockStore {
    async fn read(&self, _scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError> {
        Ok(None)
    }

    async fn create(&self, _record: &LockRecord) -> Result<CreateOutcome, LockStoreError> {
        Ok(CreateOutcome::Exists(None))
    }

    async fn delete(
        &self,
        _scope: &LockScope,
        _version: &str,
    ) -> Result<DeleteOutcome, LockStoreError> {
        Ok(DeleteOutcome::Missing)
    }
}

pub struct ScriptedPermissions {
    verdict: PermissionVerdict,
}

impl ScriptedPermissions {
    pub fn allow() -> Arc<Self> {
        Arc::new(Self {
            verdict: PermissionVerdict::Allowed,
        })
    }

    pub fn deny(message: &str) -> Arc<Self> {
        Arc::new(Self {
            verdict: PermissionVerdict::Denied(message.to_string()),
        })
    }
}

#[async_trait]
impl PermissionsGate for ScriptedPermissions {
    async fn check(&self, _actor: &str) -> anyhow::Result<PermissionVerdict> {
        Ok(self.verdict.clone())
    }
}

/// Precheck gate returning a fixed result and recording the bodies it saw.
pub struct ScriptedPrechecks {
    result: Option<PrecheckResult>,
    pub bodies: Mutex<Vec<String>>,
}

impl ScriptedPrechecks {
    pub fn passing(git_ref: &str, noop: bool) -> Arc<Self> {
        Self::returning(PrecheckResult {
            git_ref: git_ref.to_string(),
            status: true,
            message: "✔️ PR is approved and all CI checks passed - OK".to_string(),
            noop,
        })
    }

    pub fn returning(result: PrecheckResult) -> Arc<Self> {
        Arc::new(Self {
            result: Some(result),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn erroring() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrecheckGate for ScriptedPrechecks {
    async fn run(&self, body: &str, _issue_number: u64) -> anyhow::Result<PrecheckResult> {
        self.bodies.lock().unwrap().push(body.to_string());
        self.result
            .clone()
            .ok_or_else(|| anyhow!("precheck service unavailable"))
    }
}

/// Deploy API answering with a fixed response and recording every call.
pub struct RecordingDeployApi {
    response: DeploymentCreated,
    pub requests: Mutex<Vec<DeploymentRequest>>,
    pub statuses: Mutex<Vec<(u64, DeploymentState, String)>>,
}

impl RecordingDeployApi {
    pub fn with_id(id: u64) -> Arc<Self> {
        Self::responding(DeploymentCreated {
            id: Some(id),
            message: None,
        })
    }

    pub fn responding(response: DeploymentCreated) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<DeploymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(u64, DeploymentState, String)> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeployApi for RecordingDeployApi {
    async fn create_deployment(
        &self,
        request: &DeploymentRequest,
    ) -> anyhow::Result<DeploymentCreated> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        state: DeploymentState,
        environment: &str,
    ) -> anyhow::Result<()> {
        self.statuses
            .lock()
            .unwrap()
            .push((deployment_id, state, environment.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingComments {
    pub reactions: Mutex<Vec<(u64, String)>>,
    pub comments: Mutex<Vec<(u64, String)>>,
}

impl RecordingComments {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn comments(&self) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn reactions(&self) -> Vec<(u64, String)> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommentApi for RecordingComments {
    async fn react(&self, comment_id: u64, reaction: &str) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((comment_id, reaction.to_string()));
        Ok(())
    }

    async fn comment(&self, issue_number: u64, body: &str) -> anyhow::Result<()> {
        self.comments
            .lock()
            .unwrap()
            .push((issue_number, body.to_string()));
        Ok(())
    }
}

/// `issue_comment` event on pull request #123 by `monalisa`.
pub fn comment_event(body: &str) -> EventContext {
    let mut context = EventContext::new(
        "issue_comment",
        json!({
            "issue": { "number": 123, "pull_request": {} },
            "comment": { "id": 123, "body": body, "user": { "login": "monalisa" } }
        }),
        "corp/test",
    );
    context.actor = "monalisa".to_string();
    context
}

/// Same as [`comment_event`] but without a comment id.
pub fn comment_event_without_id(body: &str) -> EventContext {
    let mut context = comment_event(body);
    if let Some(comment) = context.payload["comment"].as_object_mut() {
        comment.remove("id");
    }
    context
}
