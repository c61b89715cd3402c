//! The fixed sequence of checks run against a checked-out request.
//!
//! Check failures are data: every command that runs (or fails to start) is
//! turned into a [`CheckOutcome`], never into an error.
use log::*;
use regex::Regex;
use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use crate::{
    config::{CommandConfig, EnvironmentConfig, PipelineConfig},
    process::{CommandOutput, CommandRunner, CommandSpec},
};

/// Added line ending in a suppression that names no rule code.
static BROAD_SUPPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\+(.*#\s*noqa:?\s*|\s*#\s*flake8:\s*noqa\s*)$").unwrap()
});

/// Added line ending in a suppression scoped to specific rule codes.
static SCOPED_SUPPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\+.*#\s*noqa:\s*[a-z][0-9]{0,3}(\s*,\s*[a-z][0-9]{0,3})*$")
        .unwrap()
});

/// A check whose finding can appear in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Patch branch commit already on the integration branch.
    CrossMerge,
    EnvironmentSetup,
    UnitTests,
    Lint,
    BroadSuppressions,
    ScopedSuppressions,
}

impl CheckKind {
    /// Report block heading.
    pub fn title(&self) -> &'static str {
        match self {
            CheckKind::CrossMerge => "CROSS-MERGE TESTS",
            CheckKind::EnvironmentSetup => "ENVIRONMENT SETUP",
            CheckKind::UnitTests => "UNIT TESTS",
            CheckKind::Lint => "LINT",
            CheckKind::BroadSuppressions => "BROAD SUPPRESSIONS",
            CheckKind::ScopedSuppressions => "SCOPED SUPPRESSIONS",
        }
    }

    /// Whether a finding of this kind fails the request. Scoped
    /// suppressions only route it to manual review.
    pub fn gates(&self) -> bool {
        !matches!(self, CheckKind::ScopedSuppressions)
    }
}

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    /// `None` when the check passed.
    pub finding: Option<String>,
}

impl CheckOutcome {
    pub fn new(kind: CheckKind, finding: Option<String>) -> Self {
        Self { kind, finding }
    }

    /// Outcome of a check that found nothing.
    pub fn pass(kind: CheckKind) -> Self {
        Self::new(kind, None)
    }

    /// Titled report block, empty for a passing check.
    pub fn block(&self) -> String {
        match self.finding.as_ref() {
            Some(finding) => format!(
                "##### {}:\n```\n{}\n```\n",
                self.kind.title(),
                finding.trim_end()
            ),
            None => String::new(),
        }
    }
}

/// Ordered outcomes of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    outcomes: Vec<CheckOutcome>,
}

impl PipelineResult {
    pub fn new(outcomes: Vec<CheckOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    /// Puts `outcome` ahead of every check, so its block leads the report.
    pub fn prepend(&mut self, outcome: CheckOutcome) {
        self.outcomes.insert(0, outcome);
    }

    /// True when no gating check has a finding.
    pub fn passed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| !o.kind.gates() || o.finding.is_none())
    }

    /// True when a non-gating check has a finding.
    pub fn requires_manual_review(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| !o.kind.gates() && o.finding.is_some())
    }

    /// All non-empty blocks in check order.
    pub fn blocks(&self) -> String {
        self.outcomes.iter().map(CheckOutcome::block).collect()
    }
}

/// Whether the last non-blank line of `output` is `marker`.
pub fn ends_with_marker(output: &str, marker: &str) -> bool {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim() == marker)
        .unwrap_or(false)
}

/// Added lines of a diff matching `pattern`, newline separated.
pub fn scan_added_lines(diff: &str, pattern: &Regex) -> String {
    diff.lines()
        .filter(|line| !line.starts_with("+++"))
        .filter(|line| pattern.is_match(line))
        .collect::<Vec<&str>>()
        .join("\n")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Runs the configured checks in the repository root, inside the project
/// virtualenv.
pub struct VerificationPipeline {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
    environment: EnvironmentConfig,
    config: PipelineConfig,
}

impl VerificationPipeline {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
        environment: EnvironmentConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            runner,
            root: root.into(),
            environment,
            config,
        }
    }

    /// Runs setup, unit tests, lint and both suppression scans against
    /// whatever is currently checked out.
    pub async fn run(&self) -> PipelineResult {
        let mut outcomes = vec![];

        if !self.environment.setup.is_empty() {
            outcomes.push(self.setup().await);
        }

        outcomes.push(self.unit_tests().await);
        outcomes.push(self.lint().await);

        let (broad, scoped) = self.suppression_scans().await;
        outcomes.push(broad);
        outcomes.push(scoped);

        let result = PipelineResult::new(outcomes);

        info!(
            "pipeline finished: passed: {}, manual review: {}",
            result.passed(),
            result.requires_manual_review()
        );

        result
    }

    fn virtualenv(&self) -> PathBuf {
        self.root.join(&self.environment.virtualenv)
    }

    /// `VIRTUAL_ENV` plus a `PATH` starting with the virtualenv's `bin`.
    fn environment_vars(&self) -> Vec<(String, String)> {
        let venv = self.virtualenv();
        let venv_bin = venv.join("bin");

        let mut paths = vec![venv_bin.clone()];
        if let Some(existing) = env::var_os("PATH") {
            paths.extend(env::split_paths(&existing));
        }

        let path = env::join_paths(paths)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| venv_bin.to_string_lossy().to_string());

        vec![
            ("VIRTUAL_ENV".to_string(), venv.to_string_lossy().to_string()),
            ("PATH".to_string(), path),
        ]
    }

    fn spec(&self, command: &CommandConfig) -> CommandSpec {
        self.environment_vars().into_iter().fold(
            CommandSpec::new(&command.program)
                .args(command.args.iter().cloned())
                .current_dir(&self.root),
            |spec, (key, value)| spec.env(key, value),
        )
    }

    /// Runs a check command, turning a spawn failure into output text.
    async fn execute(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, String> {
        info!("  {spec}");
        match self.runner.run(spec).await {
            Ok(output) => {
                debug!("output of `{spec}`:\n{}", output.combined());
                Ok(output)
            }
            Err(err) => {
                warn!("failed to run `{spec}`: {err}");
                Err(format!("failed to run `{spec}`: {err}"))
            }
        }
    }

    async fn setup(&self) -> CheckOutcome {
        let mut failures = vec![];

        for command in self.environment.setup.iter() {
            let spec = self.spec(command);
            match self.execute(&spec).await {
                Ok(output) if output.success() => {}
                Ok(output) => failures.push(format!(
                    "`{spec}` exited with {:?}\n{}",
                    output.code,
                    output.combined().trim_end()
                )),
                Err(message) => failures.push(message),
            }
        }

        CheckOutcome::new(CheckKind::EnvironmentSetup, non_empty(failures.join("\n")))
    }

    /// Passes when the output ends with the success marker.
    async fn unit_tests(&self) -> CheckOutcome {
        let spec = self.spec(&self.config.unit_tests);

        let finding = match self.execute(&spec).await {
            Ok(output) => {
                let combined = output.combined();
                if ends_with_marker(&combined, &self.config.success_marker) {
                    None
                } else {
                    Some(combined)
                }
            }
            Err(message) => Some(message),
        };

        CheckOutcome::new(CheckKind::UnitTests, finding)
    }

    /// Passes when the linter prints nothing and exits cleanly.
    async fn lint(&self) -> CheckOutcome {
        let spec = self.spec(&self.config.lint);

        let finding = match self.execute(&spec).await {
            Ok(output) => match non_empty(output.combined()) {
                Some(findings) => Some(findings),
                None if !output.success() => {
                    Some(format!("`{spec}` exited with {:?}", output.code))
                }
                None => None,
            },
            Err(message) => Some(message),
        };

        CheckOutcome::new(CheckKind::Lint, finding)
    }

    /// Scans the lines added by the most recent commit.
    async fn suppression_scans(&self) -> (CheckOutcome, CheckOutcome) {
        let spec = diff_spec(&self.root);

        let diff = match self.execute(&spec).await {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => {
                let message = format!(
                    "`{spec}` exited with {:?}\n{}",
                    output.code,
                    output.stderr.trim_end()
                );
                return (
                    CheckOutcome::new(CheckKind::BroadSuppressions, Some(message)),
                    CheckOutcome::pass(CheckKind::ScopedSuppressions),
                );
            }
            Err(message) => {
                return (
                    CheckOutcome::new(CheckKind::BroadSuppressions, Some(message)),
                    CheckOutcome::pass(CheckKind::ScopedSuppressions),
                );
            }
        };

        (
            CheckOutcome::new(
                CheckKind::BroadSuppressions,
                non_empty(scan_added_lines(&diff, &BROAD_SUPPRESSION)),
            ),
            CheckOutcome::new(
                CheckKind::ScopedSuppressions,
                non_empty(scan_added_lines(&diff, &SCOPED_SUPPRESSION)),
            ),
        )
    }
}

fn diff_spec(root: &Path) -> CommandSpec {
    CommandSpec::git(["diff", "HEAD^", "HEAD"]).current_dir(root)
}
