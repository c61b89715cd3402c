//! CLI argument parsing and hosting service configuration.
use clap::Parser;
use git_url_parse::GitUrl;
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

use crate::{
    config::Config,
    error::{BuildBotError, Result},
    forge::config::RemoteConfig,
};

const GITHUB_HOST: &str = "github.com";
const GITHUB_API_URL: &str = "https://api.github.com";

/// Tests open pull requests against the integration branch and reports the
/// result back as a label and a comment.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = "")]
    /// Repository URL (https://github.com/owner/repo). Falls back to `repo`
    /// in buildbot.toml.
    pub repo: String,

    #[arg(long, default_value = "")]
    /// REST API base for the repository. Derived from the repository URL
    /// when empty.
    pub api_url: String,

    #[arg(long)]
    /// Path to the config file. Defaults to buildbot.toml in the repository
    /// root.
    pub config: Option<PathBuf>,

    #[arg(long)]
    /// Directory inside the repository to test. Defaults to the current
    /// directory.
    pub repo_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    /// Run every check but only log the label and comment updates.
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    /// Enable debug logging.
    pub debug: bool,
}

impl Args {
    /// Configure the hosting service connection from CLI arguments, falling
    /// back to the config file for the repository URL.
    pub fn get_remote(
        &self,
        config: &Config,
        token: SecretString,
    ) -> Result<RemoteConfig> {
        let repo = if !self.repo.is_empty() {
            self.repo.clone()
        } else if let Some(repo) = config.repo.as_ref()
            && !repo.is_empty()
        {
            repo.clone()
        } else {
            return Err(BuildBotError::InvalidArgs(
                "must configure a repository with --repo or `repo` in buildbot.toml"
                    .into(),
            ));
        };

        let parsed = GitUrl::parse(&repo)?;

        validate_scheme(parsed.scheme)?;

        let host = parsed.host.clone().ok_or_else(|| {
            BuildBotError::InvalidArgs(format!(
                "unable to parse host from repo: {repo}"
            ))
        })?;

        let owner = parsed.owner.clone().ok_or_else(|| {
            BuildBotError::InvalidArgs(format!(
                "unable to parse owner from repo: {repo}"
            ))
        })?;

        let api_url = if self.api_url.is_empty() {
            derive_api_url(&parsed, &host, &owner)
        } else {
            with_trailing_slash(&self.api_url)
        };

        Url::parse(&api_url)?;

        Ok(RemoteConfig {
            host,
            owner,
            repo: parsed.name,
            api_url,
            token,
            dry_run: self.dry_run,
        })
    }
}

/// Validate repository URL uses HTTP or HTTPS scheme.
fn validate_scheme(scheme: git_url_parse::Scheme) -> Result<()> {
    match scheme {
        git_url_parse::Scheme::Http => Ok(()),
        git_url_parse::Scheme::Https => Ok(()),
        _ => Err(BuildBotError::InvalidArgs(
            "only http and https schemes are supported for repo urls".into(),
        )),
    }
}

/// github.com repositories live under api.github.com; any other host is
/// treated as an enterprise installation serving the API under /api/v3.
fn derive_api_url(parsed: &GitUrl, host: &str, owner: &str) -> String {
    if host == GITHUB_HOST {
        return format!("{GITHUB_API_URL}/repos/{owner}/{}/", parsed.name);
    }

    let authority = match parsed.port {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    format!(
        "{}://{authority}/api/v3/repos/{owner}/{}/",
        parsed.scheme, parsed.name
    )
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
