//! Manager that wraps forge implementations
use log::*;

use crate::{
    error::Result,
    forge::{
        config::RemoteConfig,
        traits::Forge,
        types::{Issue, IssueUpdate, PullRequest},
    },
};

pub struct ForgeManager {
    forge: Box<dyn Forge>,
    remote_config: RemoteConfig,
}

impl ForgeManager {
    pub fn new(forge: Box<dyn Forge>) -> Self {
        let remote_config = forge.remote_config();
        Self {
            forge,
            remote_config,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        self.remote_config.clone()
    }

    pub async fn list_open_pulls(&self) -> Result<Vec<PullRequest>> {
        debug!(
            "listing open pull requests for {}/{}",
            self.remote_config.owner, self.remote_config.repo
        );
        self.forge.list_open_pulls().await
    }

    pub async fn get_issue(&self, issue_url: &str) -> Result<Issue> {
        self.forge.get_issue(issue_url).await
    }

    pub async fn update_issue(
        &self,
        issue_url: &str,
        update: IssueUpdate,
    ) -> Result<()> {
        if self.remote_config.dry_run {
            warn!(
                "dry_run: would update issue: url: {issue_url}, labels: {:?}",
                update.labels
            );
            debug!("dry_run: body:\n{}", update.body);
            return Ok(());
        }
        self.forge.update_issue(issue_url, update).await
    }
}
