//! Common test helper functions shared across test modules.
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Mutex;

use crate::{
    error::Result,
    forge::config::RemoteConfig,
    process::{CommandOutput, CommandRunner, CommandSpec},
    requests::ChangeRequest,
};

/// Creates a test RemoteConfig with sensible defaults.
pub fn create_test_remote_config() -> RemoteConfig {
    RemoteConfig {
        host: "github.com".to_string(),
        owner: "upstream".to_string(),
        repo: "repo".to_string(),
        api_url: "https://api.github.com/repos/upstream/repo/".to_string(),
        token: SecretString::from("test-token".to_string()),
        dry_run: false,
    }
}

/// Creates an untested, non-patch request from "alice:feature-x" to
/// "upstream:dev" carrying `labels`.
pub fn create_test_request(labels: Vec<String>) -> ChangeRequest {
    ChangeRequest {
        number: 42,
        issue_url: "https://api.example/issues/42".to_string(),
        head_owner: "alice".to_string(),
        head_branch: "feature-x".to_string(),
        head_sha: "abc123".to_string(),
        head_remote_url: "https://github.com/alice/repo.git".to_string(),
        base_label: "upstream:dev".to_string(),
        pushed_at: Some("2024-05-01T10:00:00Z".to_string()),
        updated_at: "2024-05-01T12:00:00Z".to_string(),
        labels,
    }
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Command runner answering from a script of prefix rules. The first rule
/// whose words prefix `[program, args..]` wins; anything unmatched succeeds
/// with no output. Every call is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(Vec<String>, CommandOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: &[&str], output: CommandOutput) -> Self {
        self.rules
            .push((prefix.iter().map(|s| s.to_string()).collect(), output));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, spec: &CommandSpec) -> CommandOutput {
        let words: Vec<&str> = std::iter::once(spec.program.as_str())
            .chain(spec.args.iter().map(String::as_str))
            .collect();

        self.rules
            .iter()
            .find(|(prefix, _)| {
                prefix.len() <= words.len()
                    && prefix.iter().zip(words.iter()).all(|(p, w)| p == w)
            })
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| output(0, "", ""))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(self.respond(spec))
    }
}
