//! Local working copy operations.
//!
//! Every step that moves the shared checkout (fetch, rebase, checkout) is
//! fatal on a non-zero exit: once one of them fails the working copy can no
//! longer be trusted for any request.
use log::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::{BuildBotError, Result},
    process::{CommandOutput, CommandRunner, CommandSpec},
    requests::ChangeRequest,
};

/// Locates the top-level directory of the repository containing `start`.
pub fn discover_root(start: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start)?;
    let workdir = repo.workdir().ok_or_else(|| {
        BuildBotError::invalid_config(format!(
            "repository at {} has no working directory",
            start.display()
        ))
    })?;
    Ok(workdir.to_path_buf())
}

/// Branch names the controller works with.
#[derive(Debug, Clone)]
pub struct Branches {
    /// Branch requests target and patch commits must not already be on.
    pub integration: String,
    /// Branch restored after every request.
    pub stable: String,
    /// Remote both branches are rebased onto.
    pub upstream_remote: String,
    /// Source branch prefix marking a patch request.
    pub patch_prefix: String,
}

/// Drives git in the shared working copy at `root`.
pub struct RepositoryController {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
    branches: Branches,
}

impl RepositoryController {
    /// Create a controller running git through `runner` inside `root`.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
        branches: Branches,
    ) -> Self {
        Self {
            runner,
            root: root.into(),
            branches,
        }
    }

    /// Git command rooted at the working copy.
    fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::git(args).current_dir(&self.root)
    }

    /// Runs a git command, logging it first. The exit code is left to the
    /// caller.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        info!("  {spec}");
        let output = self.runner.run(spec).await?;
        debug!("`{spec}` exited with {:?}", output.code);
        Ok(output)
    }

    /// Runs a command that must succeed for the run to continue.
    async fn run_checked(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let output = self.run(&spec).await?;

        if !output.success() {
            error!("`{spec}` failed: {}", output.combined().trim_end());
            return Err(BuildBotError::git_command(
                spec.to_string(),
                output.code,
                output.combined().trim_end(),
            ));
        }

        Ok(output)
    }

    /// Fetches every remote and rebases the integration and stable branches
    /// onto their upstream counterparts.
    pub async fn prepare(&self) -> Result<()> {
        self.run_checked(self.git(["fetch", "--all", "--prune"]))
            .await?;

        for branch in [&self.branches.integration, &self.branches.stable] {
            let upstream =
                format!("{}/{}", self.branches.upstream_remote, branch);
            self.run_checked(self.git(["rebase", upstream.as_str(), branch.as_str()]))
                .await?;
        }

        Ok(())
    }

    /// Makes the request's source repository fetchable as a remote named
    /// after its owner. Failures are logged only; a broken remote surfaces
    /// in the following fetch.
    pub async fn register_remote(&self, request: &ChangeRequest) -> Result<()> {
        let name = request.head_owner.as_str();
        let url = request.head_remote_url.as_str();

        let existing = self.run(&self.git(["remote", "get-url", name])).await?;

        let spec = if !existing.success() {
            self.git(["remote", "add", name, url])
        } else if existing.stdout.trim() != url {
            self.git(["remote", "set-url", name, url])
        } else {
            debug!("remote {name} already points at {url}");
            return Ok(());
        };

        let output = self.run(&spec).await?;
        if !output.success() {
            warn!("`{spec}` failed: {}", output.combined().trim_end());
        }

        Ok(())
    }

    /// Checks out the request's source branch as a detached remote ref.
    pub async fn checkout(&self, request: &ChangeRequest) -> Result<()> {
        self.run_checked(self.git(["checkout", request.remote_ref().as_str()]))
            .await?;
        Ok(())
    }

    /// Returns the first commit of a patch branch that is already reachable
    /// from the integration branch, if any. Non-patch branches are not
    /// inspected.
    pub async fn cross_merge_check(
        &self,
        request: &ChangeRequest,
    ) -> Result<Option<String>> {
        if !request
            .head_branch
            .to_lowercase()
            .starts_with(&self.branches.patch_prefix.to_lowercase())
        {
            return Ok(None);
        }

        info!("  checking {} for cross-merges", request.head_label());

        let range = format!("{}..{}", self.branches.stable, request.remote_ref());
        let log = self.run(&self.git(["log", "--format=%H", range.as_str()])).await?;

        if !log.success() {
            warn!(
                "unable to list commits of {range}: {}",
                log.stderr.trim_end()
            );
            return Ok(None);
        }

        for commit in log.stdout.lines().map(str::trim).filter(|c| !c.is_empty()) {
            let contains = self
                .run(&self.git(["branch", "--contains", commit]))
                .await?;

            if !contains.success() {
                debug!("unable to resolve branches containing {commit}");
                continue;
            }

            let on_integration = contains
                .stdout
                .lines()
                .map(|line| line.trim_start_matches(['*', '+']).trim())
                .any(|branch| branch == self.branches.integration);

            if on_integration {
                warn!("    found cross-merge problem with commit {commit}");
                return Ok(Some(commit.to_string()));
            }
        }

        Ok(None)
    }

    /// Puts the stable branch back in the working copy.
    pub async fn restore_baseline(&self) -> Result<()> {
        self.run_checked(self.git(["checkout", self.branches.stable.as_str()]))
            .await?;
        Ok(())
    }
}
