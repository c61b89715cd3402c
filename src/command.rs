//! Wires configuration, the run lock and the orchestrator together for a
//! single bot run.
use log::*;
use secrecy::SecretString;
use std::{
    env,
    io::ErrorKind,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use crate::{
    cli::Args,
    config::{Config, DEFAULT_CONFIG_FILE},
    error::{BuildBotError, Result},
    forge::{github::Github, manager::ForgeManager},
    lock::LockManager,
    orchestrator::{Orchestrator, RunSummary},
    pipeline::VerificationPipeline,
    process::{CommandRunner, SystemRunner},
    repo::{Branches, RepositoryController, discover_root},
};

/// Runs the bot once. The lock is held for the whole run and released on
/// every exit path once acquired.
pub async fn execute(args: &Args) -> Result<RunSummary> {
    let start = match args.repo_dir.clone() {
        Some(dir) => dir,
        None => env::current_dir()?,
    };

    let root = discover_root(&start)?;
    info!("repository root: {}", root.display());

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));

    let config = Config::load(&config_path)?;

    let lock = LockManager::new(&config.lock_file, config.lock_stale_after()?);

    let guard = lock.acquire()?;

    let result = run(args, root, config).await;

    if let Err(err) = guard.release() {
        error!("failed to release lock {}: {err}", lock.path().display());
    }

    result
}

async fn run(args: &Args, root: PathBuf, config: Config) -> Result<RunSummary> {
    let token = read_token(&config.credential_path(&root)).await?;

    let remote = args.get_remote(&config, token)?;
    info!(
        "testing pull requests of {}/{} against {}",
        remote.owner, remote.repo, config.integration_branch
    );

    let forge = ForgeManager::new(Box::new(Github::new(remote)?));

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    let repo = RepositoryController::new(
        Arc::clone(&runner),
        &root,
        Branches {
            integration: config.integration_branch.clone(),
            stable: config.stable_branch.clone(),
            upstream_remote: config.upstream_remote.clone(),
            patch_prefix: config.patch_prefix.clone(),
        },
    );

    let pipeline = VerificationPipeline::new(
        runner,
        &root,
        config.environment.clone(),
        config.pipeline.clone(),
    );

    let orchestrator = Orchestrator::builder()
        .config(Rc::new(config))
        .forge(Rc::new(forge))
        .repo(Rc::new(repo))
        .pipeline(Rc::new(pipeline))
        .build()?;

    orchestrator.run().await
}

/// Reads the access token from the first line of the credential file.
async fn read_token(path: &Path) -> Result<SecretString> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(BuildBotError::MissingCredentials(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    let token = content.lines().next().unwrap_or_default().trim();

    if token.is_empty() {
        return Err(BuildBotError::MissingCredentials(path.to_path_buf()));
    }

    Ok(SecretString::from(token.to_string()))
}
