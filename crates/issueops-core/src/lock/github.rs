//! Lock store on the repository's refs, through the GitHub Git Data API.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::store::{CreateOutcome, DeleteOutcome, LockStore};
use super::{LOCK_FILE, LockRecord, LockScope, LockStoreError, StoredLock};
use crate::github::{ApiError, GitHubClient};

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

/// Stores locks as branches of the hosted repository.
///
/// `POST /git/refs` refuses to overwrite an existing ref (422), which is the
/// create-if-absent primitive. The REST API has no conditional delete, so
/// delete compares the current ref sha right before removing it.
#[derive(Debug, Clone)]
pub struct GitHubLockStore {
    client: GitHubClient,
}

impl GitHubLockStore {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    async fn ref_sha(&self, scope: &LockScope) -> Result<Option<String>, LockStoreError> {
        let response = self
            .client
            .get(&format!("git/ref/heads/{}", scope.branch_name()))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let reference: RefResponse = expect_json(response).await?;
        Ok(Some(reference.object.sha))
    }

    async fn record_at(
        &self,
        scope: &LockScope,
        sha: &str,
    ) -> Result<LockRecord, LockStoreError> {
        let response = self
            .client
            .get_raw(&format!("contents/{}?ref={}", LOCK_FILE, sha))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LockStoreError::Corrupt {
                key: scope.branch_name(),
                reason: format!("{} is missing", LOCK_FILE),
            });
        }
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| LockStoreError::Corrupt {
            key: scope.branch_name(),
            reason: e.to_string(),
        })
    }

    async fn write_commit(&self, record: &LockRecord) -> Result<String, LockStoreError> {
        let scope = record.scope();
        let content =
            serde_json::to_string_pretty(record).map_err(|e| LockStoreError::Corrupt {
                key: scope.branch_name(),
                reason: e.to_string(),
            })?;

        let response = self
            .client
            .post("git/trees")
            .json(&json!({
                "tree": [{
                    "path": LOCK_FILE,
                    "mode": "100644",
                    "type": "blob",
                    "content": content,
                }]
            }))
            .send()
            .await?;
        let tree: GitObject = expect_json(response).await?;

        let response = self
            .client
            .post("git/commits")
            .json(&json!({
                "message": format!("lock {} for {}", scope, record.holder),
                "tree": tree.sha,
                "parents": [],
            }))
            .send()
            .await?;
        let commit: GitObject = expect_json(response).await?;
        Ok(commit.sha)
    }
}

#[async_trait]
impl LockStore for GitHubLockStore {
    async fn read(&self, scope: &LockScope) -> Result<Option<StoredLock>, LockStoreError> {
        let Some(sha) = self.ref_sha(scope).await? else {
            return Ok(None);
        };
        let record = self.record_at(scope, &sha).await?;
        Ok(Some(StoredLock {
            record,
            version: sha,
        }))
    }

    async fn create(&self, record: &LockRecord) -> Result<CreateOutcome, LockStoreError> {
        let scope = record.scope();
        let sha = self.write_commit(record).await?;

        let response = self
            .client
            .post("git/refs")
            .json(&json!({ "ref": scope.ref_name(), "sha": sha }))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                debug!(lock = %scope.branch_name(), version = %sha, "created lock ref");
                Ok(CreateOutcome::Created(StoredLock {
                    record: record.clone(),
                    version: sha,
                }))
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(lock = %scope.branch_name(), "lock ref already exists");
                Ok(CreateOutcome::Exists(self.read(&scope).await?))
            }
            _ => Err(ApiError::from_response(response).await.into()),
        }
    }

    async fn delete(
        &self,
        scope: &LockScope,
        version: &str,
    ) -> Result<DeleteOutcome, LockStoreError> {
        match self.ref_sha(scope).await? {
            None => return Ok(DeleteOutcome::Missing),
            Some(current) if current != version => return Ok(DeleteOutcome::Changed),
            Some(_) => {}
        }

        let response = self
            .client
            .delete(&format!("git/refs/heads/{}", scope.branch_name()))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!(lock = %scope.branch_name(), version, "deleted lock ref");
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => Ok(DeleteOutcome::Missing),
            _ => Err(ApiError::from_response(response).await.into()),
        }
    }
}

async fn expect_json<T: DeserializeOwned>(response: Response) -> Result<T, LockStoreError> {
    if !response.status().is_success() {
        return Err(ApiError::from_response(response).await.into());
    }
    Ok(response.json().await?)
}
