use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::client::{ApiError, GitHubClient};
use crate::gates::{PermissionVerdict, PermissionsGate};

const ALLOWED: &[&str] = &["admin", "maintain", "write"];

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

/// Allows collaborators with write access or better.
#[derive(Debug, Clone)]
pub struct GitHubPermissions {
    client: GitHubClient,
}

impl GitHubPermissions {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PermissionsGate for GitHubPermissions {
    async fn check(&self, actor: &str) -> anyhow::Result<PermissionVerdict> {
        let response = self
            .client
            .get(&format!("collaborators/{}/permission", actor))
            .send()
            .await
            .context("Failed to query collaborator permission")?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        let body: PermissionResponse = response
            .json()
            .await
            .context("Invalid collaborator permission response")?;

        debug!(actor, permission = %body.permission, "collaborator permission");
        Ok(verdict(actor, &body.permission))
    }
}

fn verdict(actor: &str, permission: &str) -> PermissionVerdict {
    if ALLOWED.contains(&permission) {
        PermissionVerdict::Allowed
    } else {
        PermissionVerdict::Denied(format!(
            "👋 __{}__, seems as if you have not admin/write permissions in this repo, permissions: {}",
            actor, permission
        ))
    }
}
