//! Wire types for the hosting service REST API.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRepo {
    pub clone_url: String,
    pub owner: RepoOwner,
    pub pushed_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRef {
    /// "owner:branch"
    pub label: String,
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
    /// Missing when the source repository has been deleted.
    pub repo: Option<PullRepo>,
}

/// An open pull request as listed by the hosting service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub issue_url: String,
    pub head: PullRef,
    pub base: PullRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Issue metadata backing a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub labels: Vec<Label>,
    pub updated_at: String,
    pub body: Option<String>,
}

impl Issue {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

/// Replaces the labels and body of an issue in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueUpdate {
    pub labels: Vec<String>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_pull_request() {
        let pull: PullRequest = serde_json::from_value(json!({
            "number": 7,
            "issue_url": "https://api.github.com/repos/o/r/issues/7",
            "body": null,
            "head": {
                "label": "alice:patch-fix",
                "ref": "patch-fix",
                "sha": "abc",
                "repo": {
                    "clone_url": "https://github.com/alice/r.git",
                    "owner": { "login": "alice" },
                    "pushed_at": "2024-01-02T03:04:05Z"
                }
            },
            "base": {
                "label": "o:dev",
                "ref": "dev",
                "sha": "def",
                "repo": null
            }
        }))
        .unwrap();

        assert_eq!(pull.head.branch, "patch-fix");
        assert_eq!(pull.head.repo.unwrap().owner.login, "alice");
        assert!(pull.base.repo.is_none());
    }

    #[test]
    fn collects_label_names() {
        let issue = Issue {
            labels: vec![
                Label { name: "bug".into() },
                Label { name: "Tests: OK".into() },
            ],
            ..Issue::default()
        };
        assert_eq!(issue.label_names(), vec!["bug", "Tests: OK"]);
    }
}
