//! Discovery of pull requests that need a test run.
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    decision::TestStatus,
    error::Result,
    forge::{
        manager::ForgeManager,
        types::{Issue, PullRequest},
    },
};

/// A pull request combined with the issue metadata the bot decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequest {
    pub number: u64,
    pub issue_url: String,
    /// Owner of the source repository, used as the git remote name.
    pub head_owner: String,
    pub head_branch: String,
    pub head_sha: String,
    pub head_remote_url: String,
    /// "owner:branch" of the target.
    pub base_label: String,
    pub pushed_at: Option<String>,
    pub updated_at: String,
    pub labels: Vec<String>,
}

impl ChangeRequest {
    /// Builds a request from the listed pull and its issue. Returns `None`
    /// when the source repository no longer exists.
    pub fn from_parts(pull: PullRequest, issue: Issue) -> Option<Self> {
        let repo = pull.head.repo?;

        let head_owner = match pull.head.label.split_once(':') {
            Some((owner, _)) => owner.to_string(),
            None => repo.owner.login.clone(),
        };

        Some(Self {
            number: pull.number,
            labels: issue.label_names(),
            issue_url: pull.issue_url,
            head_owner,
            head_branch: pull.head.branch,
            head_sha: pull.head.sha,
            head_remote_url: repo.clone_url,
            base_label: pull.base.label,
            pushed_at: repo.pushed_at,
            updated_at: issue.updated_at,
        })
    }

    /// "owner:branch", stable across runs.
    pub fn head_label(&self) -> String {
        format!("{}:{}", self.head_owner, self.head_branch)
    }

    /// Remote-tracking ref of the source branch once its remote is fetched.
    pub fn remote_ref(&self) -> String {
        format!("remotes/{}/{}", self.head_owner, self.head_branch)
    }
}

pub struct RequestSource<'a> {
    forge: &'a ForgeManager,
    integration_branch: String,
}

impl<'a> RequestSource<'a> {
    pub fn new(forge: &'a ForgeManager, integration_branch: impl Into<String>) -> Self {
        Self {
            forge,
            integration_branch: integration_branch.into(),
        }
    }

    /// Open requests whose base branch is the integration branch. A request
    /// whose issue cannot be read is logged and left out of this run.
    pub async fn list_open_requests(&self) -> Result<Vec<ChangeRequest>> {
        let pulls = self.forge.list_open_pulls().await?;
        let mut requests = vec![];

        for pull in pulls.into_iter() {
            if pull.base.branch != self.integration_branch {
                info!(
                    "skipping {} -> {}: does not target {}",
                    pull.head.label, pull.base.label, self.integration_branch
                );
                continue;
            }

            let issue = match self.forge.get_issue(&pull.issue_url).await {
                Ok(issue) => issue,
                Err(err) => {
                    error!(
                        "failed to load issue for pull request #{}: {err}",
                        pull.number
                    );
                    continue;
                }
            };

            let number = pull.number;

            match ChangeRequest::from_parts(pull, issue) {
                Some(request) => requests.push(request),
                None => warn!(
                    "skipping pull request #{number}: source repository is gone"
                ),
            }
        }

        Ok(requests)
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            warn!("unparsable timestamp {value:?}: {err}");
            None
        }
    }
}

/// Whether a request must be (re)tested. A terminal test label applied
/// after the last push means the current head was already evaluated; any
/// timestamp that cannot be read forces a new run.
pub fn needs_testing(request: &ChangeRequest) -> bool {
    let already_evaluated = request.labels.iter().any(|label| {
        label == TestStatus::Ok.label() || label == TestStatus::Fail.label()
    });

    if !already_evaluated {
        return true;
    }

    let pushed_at = request.pushed_at.as_deref().and_then(parse_timestamp);
    let updated_at = parse_timestamp(&request.updated_at);

    match (pushed_at, updated_at) {
        (Some(pushed), Some(updated)) => pushed >= updated,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        forge::{
            config::RemoteConfig,
            traits::MockForge,
            types::{Label, PullRef, PullRepo, RepoOwner},
        },
        test_helpers::create_test_request,
    };

    fn pull(number: u64, head_label: &str, base_label: &str) -> PullRequest {
        let (owner, branch) = head_label.split_once(':').unwrap();
        PullRequest {
            number,
            issue_url: format!("https://api.example/issues/{number}"),
            head: PullRef {
                label: head_label.into(),
                branch: branch.into(),
                sha: "abc123".into(),
                repo: Some(PullRepo {
                    clone_url: format!("https://github.com/{owner}/repo.git"),
                    owner: RepoOwner {
                        login: owner.into(),
                    },
                    pushed_at: Some("2024-05-01T10:00:00Z".into()),
                }),
            },
            base: PullRef {
                label: base_label.into(),
                branch: base_label.split_once(':').unwrap().1.into(),
                ..PullRef::default()
            },
        }
    }

    fn issue(labels: &[&str]) -> Issue {
        Issue {
            labels: labels
                .iter()
                .map(|name| Label {
                    name: name.to_string(),
                })
                .collect(),
            updated_at: "2024-05-01T12:00:00Z".into(),
            body: None,
        }
    }

    #[test]
    fn untested_request_needs_testing() {
        let request = create_test_request(vec![]);
        assert!(needs_testing(&request));
    }

    #[test]
    fn terminal_label_after_push_skips_testing() {
        for label in ["Tests: OK", "Tests: FAIL"] {
            let request = ChangeRequest {
                pushed_at: Some("2024-05-01T10:00:00Z".into()),
                updated_at: "2024-05-01T12:00:00Z".into(),
                ..create_test_request(vec![label.into()])
            };
            assert!(!needs_testing(&request), "{label}");
        }
    }

    #[test]
    fn push_after_label_needs_testing() {
        let request = ChangeRequest {
            pushed_at: Some("2024-05-01T13:00:00Z".into()),
            updated_at: "2024-05-01T12:00:00Z".into(),
            ..create_test_request(vec!["Tests: OK".into()])
        };
        assert!(needs_testing(&request));
    }

    #[test]
    fn manual_label_is_not_terminal() {
        let request = ChangeRequest {
            pushed_at: Some("2024-05-01T10:00:00Z".into()),
            updated_at: "2024-05-01T12:00:00Z".into(),
            ..create_test_request(vec!["Tests: MANUAL".into()])
        };
        assert!(needs_testing(&request));
    }

    #[test]
    fn unparsable_timestamps_fail_open() {
        let request = ChangeRequest {
            pushed_at: Some("yesterday".into()),
            updated_at: "2024-05-01T12:00:00Z".into(),
            ..create_test_request(vec!["Tests: OK".into()])
        };
        assert!(needs_testing(&request));

        let request = ChangeRequest {
            pushed_at: None,
            ..create_test_request(vec!["Tests: FAIL".into()])
        };
        assert!(needs_testing(&request));
    }

    #[test]
    fn builds_request_from_pull_and_issue() {
        let request = ChangeRequest::from_parts(
            pull(5, "alice:patch-1", "upstream:dev"),
            issue(&["bug"]),
        )
        .unwrap();

        assert_eq!(request.head_owner, "alice");
        assert_eq!(request.head_branch, "patch-1");
        assert_eq!(request.head_label(), "alice:patch-1");
        assert_eq!(request.remote_ref(), "remotes/alice/patch-1");
        assert_eq!(request.head_remote_url, "https://github.com/alice/repo.git");
        assert_eq!(request.labels, vec!["bug"]);
        assert_eq!(request.updated_at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn deleted_source_repository_yields_none() {
        let mut pull = pull(5, "alice:patch-1", "upstream:dev");
        pull.head.repo = None;
        assert!(ChangeRequest::from_parts(pull, issue(&[])).is_none());
    }

    #[tokio::test]
    async fn lists_only_requests_targeting_integration_branch() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_list_open_pulls().returning(|| {
            Ok(vec![
                pull(1, "alice:feature", "upstream:dev"),
                pull(2, "bob:hotfix", "upstream:master"),
            ])
        });
        mock_forge
            .expect_get_issue()
            .withf(|url| url == "https://api.example/issues/1")
            .times(1)
            .returning(|_| Ok(issue(&[])));

        let forge = ForgeManager::new(Box::new(mock_forge));
        let source = RequestSource::new(&forge, "dev");

        let requests = source.list_open_requests().await.unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].number, 1);
    }

    #[tokio::test]
    async fn base_owner_name_does_not_select_request() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_list_open_pulls().returning(|| {
            Ok(vec![
                pull(1, "alice:feature", "devtools-org:master"),
                pull(2, "bob:feature", "devtools-org:dev"),
                pull(3, "carol:feature", "devtools-org:dev-old"),
            ])
        });
        mock_forge
            .expect_get_issue()
            .withf(|url| url == "https://api.example/issues/2")
            .times(1)
            .returning(|_| Ok(issue(&[])));

        let forge = ForgeManager::new(Box::new(mock_forge));
        let source = RequestSource::new(&forge, "dev");

        let requests = source.list_open_requests().await.unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].number, 2);
    }

    #[tokio::test]
    async fn issue_failure_skips_only_that_request() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_list_open_pulls().returning(|| {
            Ok(vec![
                pull(1, "alice:feature", "upstream:dev"),
                pull(2, "bob:other", "upstream:dev"),
            ])
        });
        mock_forge.expect_get_issue().returning(|url| {
            if url.ends_with("/1") {
                Err(crate::BuildBotError::NetworkError("timeout".into()))
            } else {
                Ok(issue(&["Tests: OK"]))
            }
        });

        let forge = ForgeManager::new(Box::new(mock_forge));
        let source = RequestSource::new(&forge, "dev");

        let requests = source.list_open_requests().await.unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].head_owner, "bob");
        assert_eq!(requests[0].labels, vec!["Tests: OK"]);
    }

    #[tokio::test]
    async fn listing_failure_is_propagated() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge
            .expect_list_open_pulls()
            .returning(|| Err(crate::BuildBotError::NetworkError("down".into())));

        let forge = ForgeManager::new(Box::new(mock_forge));
        let source = RequestSource::new(&forge, "dev");

        assert!(source.list_open_requests().await.is_err());
    }
}
