//! Traits related to the remote hosting service
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::{
    error::Result,
    forge::{
        config::RemoteConfig,
        types::{Issue, IssueUpdate, PullRequest},
    },
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Forge: Send + Sync {
    fn remote_config(&self) -> RemoteConfig;
    /// All open pull requests of the repository.
    async fn list_open_pulls(&self) -> Result<Vec<PullRequest>>;
    async fn get_issue(&self, issue_url: &str) -> Result<Issue>;
    /// Fails with [`crate::BuildBotError::UpdateRejected`] unless the
    /// service answers 200 or 201.
    async fn update_issue(&self, issue_url: &str, update: IssueUpdate) -> Result<()>;
}
