use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::client::{ApiError, GitHubClient};
use crate::gates::CommentApi;

#[derive(Debug, Clone)]
pub struct GitHubComments {
    client: GitHubClient,
}

impl GitHubComments {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommentApi for GitHubComments {
    async fn react(&self, comment_id: u64, reaction: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&format!("issues/comments/{}/reactions", comment_id))
            .json(&json!({ "content": reaction }))
            .send()
            .await
            .context("Failed to add reaction")?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        Ok(())
    }

    async fn comment(&self, issue_number: u64, body: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&format!("issues/{}/comments", issue_number))
            .json(&json!({ "body": body }))
            .send()
            .await
            .context("Failed to post comment")?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        Ok(())
    }
}
