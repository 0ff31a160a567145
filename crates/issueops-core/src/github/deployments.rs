use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::client::{ApiError, GitHubClient};
use crate::config::RequiredContexts;
use crate::gates::{DeployApi, DeploymentCreated, DeploymentRequest, DeploymentState};

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: Option<u64>,
    message: Option<String>,
}

/// Deployment records through the Deployments API.
#[derive(Debug, Clone)]
pub struct GitHubDeployments {
    client: GitHubClient,
    required_contexts: RequiredContexts,
}

impl GitHubDeployments {
    pub fn new(client: GitHubClient, required_contexts: RequiredContexts) -> Self {
        Self {
            client,
            required_contexts,
        }
    }

    fn body(&self, request: &DeploymentRequest) -> serde_json::Value {
        let mut body = json!({
            "ref": request.git_ref,
            "environment": request.environment,
            "auto_merge": true,
            "payload": { "type": "branch-deploy", "noop": request.noop },
            "production_environment": !request.noop,
            "transient_environment": false,
            "description": format!("IssueOps deployment to {}", request.environment),
        });
        // Omitting required_contexts lets GitHub require every context.
        if let RequiredContexts::Only(contexts) = &self.required_contexts {
            body["required_contexts"] = json!(contexts);
        }
        body
    }
}

#[async_trait]
impl DeployApi for GitHubDeployments {
    async fn create_deployment(
        &self,
        request: &DeploymentRequest,
    ) -> anyhow::Result<DeploymentCreated> {
        let response = self
            .client
            .post("deployments")
            .json(&self.body(request))
            .send()
            .await
            .context("Failed to create deployment")?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                let created: CreatedResponse = response
                    .json()
                    .await
                    .context("Invalid deployment response")?;
                info!(id = ?created.id, git_ref = %request.git_ref, environment = %request.environment, "deployment created");
                Ok(DeploymentCreated {
                    id: created.id,
                    message: created.message,
                })
            }
            _ => Err(ApiError::from_response(response).await.into()),
        }
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        state: DeploymentState,
        environment: &str,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&format!("deployments/{}/statuses", deployment_id))
            .json(&json!({
                "state": state.as_str(),
                "environment": environment,
            }))
            .send()
            .await
            .context("Failed to create deployment status")?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        debug!(deployment_id, state = state.as_str(), "deployment status recorded");
        Ok(())
    }
}
