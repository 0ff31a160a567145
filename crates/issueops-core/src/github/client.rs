//! Minimal authenticated client for the GitHub REST API.

use anyhow::Context;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response};
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = concat!("issueops/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// Non-success response from the API, with GitHub's own message.
#[derive(Debug, Clone, Error)]
#[error("GitHub API returned {status} for {url}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub url: String,
    pub message: String,
}

impl ApiError {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        Self {
            status,
            url,
            message,
        }
    }
}

/// Client scoped to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
    repository: String,
}

impl GitHubClient {
    /// Build a client for `repository` ("owner/repo").
    ///
    /// `api_base` is the REST root, e.g. `https://api.github.com` or
    /// `https://ghe.example.com/api/v3`.
    pub fn new(
        api_base: &str,
        token: impl Into<String>,
        repository: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut api_base =
            Url::parse(api_base).with_context(|| format!("Invalid GitHub API URL: {}", api_base))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let repository = repository.into();
        Self::parse_repository(&repository)?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_base,
            token: token.into(),
            repository,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Absolute URL of a repository-scoped endpoint.
    pub fn repo_endpoint(&self, path: &str) -> String {
        format!(
            "{}repos/{}/{}",
            self.api_base,
            self.repository,
            path.trim_start_matches('/')
        )
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path, JSON_MEDIA_TYPE)
    }

    /// GET returning raw file content instead of the JSON envelope.
    pub fn get_raw(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path, RAW_MEDIA_TYPE)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path, JSON_MEDIA_TYPE)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path, JSON_MEDIA_TYPE)
    }

    fn request(&self, method: Method, path: &str, accept: &'static str) -> RequestBuilder {
        self.http
            .request(method, self.repo_endpoint(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Parse "owner/repo" into components
    pub fn parse_repository(repository: &str) -> anyhow::Result<(&str, &str)> {
        let parts: Vec<&str> = repository.split('/').collect();

        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok((*owner, *repo)),
            _ => anyhow::bail!("Invalid GitHub repository format: {}", repository),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_endpoint() {
        let client = GitHubClient::new("https://api.github.com", "token", "corp/test").unwrap();
        assert_eq!(
            client.repo_endpoint("git/refs"),
            "https://api.github.com/repos/corp/test/git/refs"
        );
        assert_eq!(
            client.repo_endpoint("/pulls/1"),
            "https://api.github.com/repos/corp/test/pulls/1"
        );
    }

    #[test]
    fn test_enterprise_base_keeps_path() {
        let client =
            GitHubClient::new("https://ghe.example.com/api/v3", "token", "corp/test").unwrap();
        assert_eq!(
            client.repo_endpoint("deployments"),
            "https://ghe.example.com/api/v3/repos/corp/test/deployments"
        );
    }

    #[test]
    fn test_parse_repository() {
        let (owner, repo) = GitHubClient::parse_repository("corp/test").unwrap();
        assert_eq!(owner, "corp");
        assert_eq!(repo, "test");
    }

    #[test]
    fn test_parse_repository_invalid() {
        assert!(GitHubClient::parse_repository("invalid-format").is_err());
        assert!(GitHubClient::parse_repository("a/b/c").is_err());
        assert!(GitHubClient::new("not a url", "token", "corp/test").is_err());
    }
}
