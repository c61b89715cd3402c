//! Drives the per-request lifecycle of a bot run.
use chrono::Utc;
use derive_builder::Builder;
use log::*;
use std::rc::Rc;

use crate::{
    BuildBotError, Result,
    config::Config,
    decision::{Decision, decide},
    forge::manager::ForgeManager,
    pipeline::{CheckKind, CheckOutcome, VerificationPipeline},
    publisher::ReportPublisher,
    repo::RepositoryController,
    requests::{ChangeRequest, RequestSource, needs_testing},
    state::{PersistedState, StateEntry},
};


/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Open requests targeting the integration branch.
    pub candidates: usize,
    pub tested: usize,
    /// Requests whose current head already carries a result.
    pub skipped: usize,
    pub publish_failures: usize,
}

/// Collaborators an [`Orchestrator`] is built from.
#[derive(Builder)]
#[builder(setter(into), build_fn(private, name = "_build"))]
pub struct OrchestratorParams {
    pub config: Rc<Config>,
    pub forge: Rc<ForgeManager>,
    pub repo: Rc<RepositoryController>,
    pub pipeline: Rc<VerificationPipeline>,
}

impl OrchestratorParamsBuilder {
    /// Builds the orchestrator, failing when a collaborator is missing.
    pub fn build(&self) -> Result<Orchestrator> {
        let params = self._build().map_err(|e| {
            BuildBotError::invalid_config(format!(
                "Failed to build orchestrator: {}",
                e
            ))
        })?;
        Ok(Orchestrator::new(params))
    }
}

/// Runs the test lifecycle for every open request, one at a time, against
/// the single shared working copy.
pub struct Orchestrator {
    config: Rc<Config>,
    forge: Rc<ForgeManager>,
    repo: Rc<RepositoryController>,
    pipeline: Rc<VerificationPipeline>,
}

impl Orchestrator {
    /// Returns a builder for the orchestrator's parameters.
    pub fn builder() -> OrchestratorParamsBuilder {
        OrchestratorParamsBuilder::default()
    }

    /// Create an orchestrator from its built parameters.
    pub fn new(params: OrchestratorParams) -> Self {
        Self {
            config: params.config,
            forge: params.forge,
            repo: params.repo,
            pipeline: params.pipeline,
        }
    }

    /// Tests every open request that needs it, one at a time. The stable
    /// branch is checked out again after each tested request, including
    /// when a fatal error aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut state = PersistedState::load(&self.config.state_file);

        let source =
            RequestSource::new(&self.forge, &self.config.integration_branch);
        let requests = source.list_open_requests().await?;

        let mut summary = RunSummary {
            candidates: requests.len(),
            ..RunSummary::default()
        };

        let remote = self.forge.remote_config();
        info!(
            "found {} candidate pull requests in {}/{}",
            summary.candidates, remote.owner, remote.repo
        );

        for request in requests.iter() {
            if !needs_testing(request) {
                info!(
                    "skipping pull request #{} ({} -> {}): already tested",
                    request.number,
                    request.head_label(),
                    request.base_label
                );
                summary.skipped += 1;
                continue;
            }

            info!(
                "testing pull request #{} ({} -> {})",
                request.number,
                request.head_label(),
                request.base_label
            );

            if let Some(previous) = state.get(&request.head_label()) {
                debug!(
                    "  previous result: {} at {}",
                    previous.status, previous.head_sha
                );
            }

            let tested = self.test_request(request, &mut summary).await;
            let restored = self.repo.restore_baseline().await;

            let decision = match tested {
                Ok(decision) => decision,
                Err(err) => {
                    if let Err(restore_err) = restored {
                        error!("failed to restore baseline: {restore_err}");
                    }
                    return Err(err);
                }
            };

            restored?;

            summary.tested += 1;
            state.record(
                request.head_label(),
                StateEntry {
                    status: decision.status,
                    head_sha: request.head_sha.clone(),
                    tested_at: Utc::now().timestamp(),
                },
            );
        }

        if let Err(err) = state.save() {
            error!(
                "failed to write state file {}: {err}",
                state.path().display()
            );
        }

        Ok(summary)
    }

    /// Prepares the working copy, runs the checks and publishes the
    /// decision. Errors returned here abort the run.
    async fn test_request(
        &self,
        request: &ChangeRequest,
        summary: &mut RunSummary,
    ) -> Result<Decision> {
        self.repo.register_remote(request).await?;
        self.repo.prepare().await?;

        let violation = self.repo.cross_merge_check(request).await?;

        self.repo.checkout(request).await?;

        let mut result = self.pipeline.run().await;

        if let Some(commit) = violation {
            result.prepend(CheckOutcome::new(
                CheckKind::CrossMerge,
                Some(format!(
                    "commit {commit} of {} is already on {}",
                    request.head_branch, self.config.integration_branch
                )),
            ));
        }

        let decision = decide(&result);
        info!("  decision: {}", decision.status);

        let publisher =
            ReportPublisher::new(&self.forge, &self.config.report_delimiter);

        if let Err(err) = publisher.publish(request, &decision).await {
            error!(
                "failed to update pull request #{}: {err}",
                request.number
            );
            summary.publish_failures += 1;
        }

        Ok(decision)
    }
}
