//! GitHub REST implementations of the collaborator interfaces.

pub mod client;
pub mod comments;
pub mod deployments;
pub mod permissions;
pub mod prechecks;

pub use client::{ApiError, GitHubClient};
pub use comments::GitHubComments;
pub use deployments::GitHubDeployments;
pub use permissions::GitHubPermissions;
pub use prechecks::GitHubPrechecks;
