//! Configuration loading and parsing for `buildbot.toml` files.
//!
//! Every table uses serde defaults so a config file only needs to name the
//! settings it changes. A missing file yields [`Config::default`].
use chrono::Duration;
use log::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{BuildBotError, Result};

/// Default configuration filename, looked up in the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "buildbot.toml";
/// Default location of the lock marker.
pub const DEFAULT_LOCK_FILE: &str = "/tmp/buildbot.lock";
/// Age after which a lock marker is considered abandoned.
pub const DEFAULT_LOCK_STALE_MINUTES: i64 = 90;
/// Default location of the persisted state file.
pub const DEFAULT_STATE_FILE: &str = "/tmp/buildbot.states";
/// Default credential file, relative to the repository root.
pub const DEFAULT_CREDENTIAL_FILE: &str = ".githubkey";
/// Separates the author's description from the bot-owned report in a
/// pull request body.
pub const DEFAULT_REPORT_DELIMITER: &str = "\n####BUILD-BOT##AUTO##TEST####\n";

/// A subprocess named by program and argument list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandConfig {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Test environment the checks run inside.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Virtualenv directory relative to the repository root.
    pub virtualenv: String,
    /// Commands run once before the checks (e.g. dependency installs).
    pub setup: Vec<CommandConfig>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            virtualenv: ".venv".to_string(),
            setup: vec![],
        }
    }
}

/// Commands making up the verification pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub unit_tests: CommandConfig,
    /// Last non-blank line the unit test output must end with to pass.
    pub success_marker: String,
    /// Lint command; passes when it prints nothing.
    pub lint: CommandConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            unit_tests: CommandConfig::new("nosetests", &["-v"]),
            success_marker: "OK".to_string(),
            lint: CommandConfig::new("flake8", &["."]),
        }
    }
}

/// Root configuration structure for `buildbot.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hosting repository web URL, overridden by `--repo`.
    pub repo: Option<String>,
    /// Branch change requests must target to be tested.
    pub integration_branch: String,
    /// Branch restored after every request.
    pub stable_branch: String,
    /// Remote the integration and stable branches track.
    pub upstream_remote: String,
    /// Source branch prefix marking a patch request.
    pub patch_prefix: String,
    pub lock_file: PathBuf,
    pub lock_stale_minutes: i64,
    pub state_file: PathBuf,
    /// Credential file; relative paths resolve against the repository root.
    pub credential_file: PathBuf,
    pub report_delimiter: String,
    pub environment: EnvironmentConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo: None,
            integration_branch: "dev".to_string(),
            stable_branch: "master".to_string(),
            upstream_remote: "origin".to_string(),
            patch_prefix: "patch".to_string(),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            lock_stale_minutes: DEFAULT_LOCK_STALE_MINUTES,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            credential_file: PathBuf::from(DEFAULT_CREDENTIAL_FILE),
            report_delimiter: DEFAULT_REPORT_DELIMITER.to_string(),
            environment: EnvironmentConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Loads config from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!("loading config from {}", path.display());
                let config: Config = toml::from_str(&content)?;
                config.lock_stale_after()?;
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}: using defaults", path.display());
                Ok(Config::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Absolute credential file path for a repository root.
    /// Age after which a lock marker is reclaimed. Must be a positive number
    /// of minutes that fits a duration.
    pub fn lock_stale_after(&self) -> Result<Duration> {
        if self.lock_stale_minutes <= 0 {
            return Err(BuildBotError::invalid_config(format!(
                "lock_stale_minutes must be positive, got {}",
                self.lock_stale_minutes
            )));
        }

        Duration::try_minutes(self.lock_stale_minutes).ok_or_else(|| {
            BuildBotError::invalid_config(format!(
                "lock_stale_minutes is out of range: {}",
                self.lock_stale_minutes
            ))
        })
    }

    pub fn credential_path(&self, root: &Path) -> PathBuf {
        if self.credential_file.is_absolute() {
            self.credential_file.clone()
        } else {
            root.join(&self.credential_file)
        }
    }
}
