//! Implements the Forge trait for Github
use async_trait::async_trait;
use log::*;
use reqwest::{
    Client, StatusCode, Url,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use secrecy::ExposeSecret;

use crate::{
    error::{BuildBotError, Result},
    forge::{
        config::{self, DEFAULT_PAGE_SIZE, RemoteConfig},
        traits::Forge,
        types::{Issue, IssueUpdate, PullRequest},
    },
};

/// Github forge implementation using reqwest against the REST API.
pub struct Github {
    config: RemoteConfig,
    base_url: Url,
    client: Client,
}

impl Github {
    /// Create Github client with token authentication against the
    /// configured repository API base.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let token = config.token.expose_secret();

        let mut headers = HeaderMap::new();

        let token_value =
            HeaderValue::from_str(format!("token {}", token).as_str())?;

        headers.append(AUTHORIZATION, token_value);
        headers.append(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.append(USER_AGENT, HeaderValue::from_static(config::USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(&config.api_url)?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }
}

#[async_trait]
impl Forge for Github {
    fn remote_config(&self) -> RemoteConfig {
        self.config.clone()
    }

    async fn list_open_pulls(&self) -> Result<Vec<PullRequest>> {
        let page_limit = DEFAULT_PAGE_SIZE.to_string();
        let mut page = 1;
        let mut pulls = vec![];

        loop {
            let mut pulls_url = self.base_url.join("pulls")?;

            pulls_url
                .query_pairs_mut()
                .append_pair("state", "open")
                .append_pair("per_page", &page_limit)
                .append_pair("page", &page.to_string());

            let request = self.client.get(pulls_url).build()?;
            let response = self.client.execute(request).await?;
            let result = response.error_for_status()?;
            let batch: Vec<PullRequest> = result.json().await?;

            debug!("fetched {} pull requests from page {page}", batch.len());

            let done = batch.len() < DEFAULT_PAGE_SIZE as usize;
            pulls.extend(batch);

            if done {
                break;
            }

            page += 1;
        }

        Ok(pulls)
    }

    async fn get_issue(&self, issue_url: &str) -> Result<Issue> {
        let url = Url::parse(issue_url)?;
        let request = self.client.get(url).build()?;
        let response = self.client.execute(request).await?;
        let result = response.error_for_status()?;
        let issue: Issue = result.json().await?;
        Ok(issue)
    }

    async fn update_issue(
        &self,
        issue_url: &str,
        update: IssueUpdate,
    ) -> Result<()> {
        let url = Url::parse(issue_url)?;
        let request = self.client.post(url).json(&update).build()?;
        let response = self.client.execute(request).await?;

        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();

        Err(BuildBotError::UpdateRejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    fn github_for(server: &MockServer) -> Github {
        Github::new(RemoteConfig {
            host: "github.com".into(),
            owner: "owner".into(),
            repo: "repo".into(),
            api_url: format!("{}/repos/owner/repo/", server.uri()),
            token: SecretString::from("secret-token".to_string()),
            dry_run: false,
        })
        .unwrap()
    }

    fn pull_json(number: u64) -> serde_json::Value {
        json!({
            "number": number,
            "issue_url": format!("https://example.invalid/issues/{number}"),
            "body": "description",
            "head": {
                "label": "alice:feature",
                "ref": "feature",
                "sha": "abc",
                "repo": {
                    "clone_url": "https://github.com/alice/repo.git",
                    "owner": { "login": "alice" },
                    "pushed_at": "2024-01-02T03:04:05Z"
                }
            },
            "base": { "label": "owner:dev", "ref": "dev", "sha": "def", "repo": null }
        })
    }

    #[tokio::test]
    async fn lists_open_pulls_with_token_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/pulls"))
            .and(query_param("state", "open"))
            .and(query_param("page", "1"))
            .and(header("Authorization", "token secret-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([pull_json(1), pull_json(2)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pulls = github_for(&server).list_open_pulls().await.unwrap();

        assert_eq!(pulls.len(), 2);
        assert_eq!(pulls[1].number, 2);
    }

    #[tokio::test]
    async fn follows_pagination_until_short_page() {
        let server = MockServer::start().await;

        let full_page: Vec<serde_json::Value> =
            (1..=DEFAULT_PAGE_SIZE as u64).map(pull_json).collect();

        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/pulls"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/pulls"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([pull_json(101)])),
            )
            .mount(&server)
            .await;

        let pulls = github_for(&server).list_open_pulls().await.unwrap();

        assert_eq!(pulls.len(), DEFAULT_PAGE_SIZE as usize + 1);
    }

    #[tokio::test]
    async fn gets_issue_by_absolute_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/issues/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [{ "name": "Tests: OK" }],
                "updated_at": "2024-01-02T03:04:05Z",
                "body": null
            })))
            .mount(&server)
            .await;

        let issue = github_for(&server)
            .get_issue(&format!("{}/repos/owner/repo/issues/7", server.uri()))
            .await
            .unwrap();

        assert_eq!(issue.label_names(), vec!["Tests: OK"]);
        assert!(issue.body.is_none());
    }

    #[tokio::test]
    async fn update_accepts_created_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/repos/owner/repo/issues/7"))
            .and(body_json(json!({
                "labels": ["Tests: FAIL"],
                "body": "report"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        github_for(&server)
            .update_issue(
                &format!("{}/repos/owner/repo/issues/7", server.uri()),
                IssueUpdate {
                    labels: vec!["Tests: FAIL".into()],
                    body: "report".into(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_rejects_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/repos/owner/repo/issues/7"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = github_for(&server)
            .update_issue(
                &format!("{}/repos/owner/repo/issues/7", server.uri()),
                IssueUpdate {
                    labels: vec![],
                    body: "".into(),
                },
            )
            .await;

        match result {
            Err(BuildBotError::UpdateRejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_api_url() {
        let result = Github::new(RemoteConfig {
            api_url: "not a url".into(),
            ..RemoteConfig::default()
        });
        assert!(result.is_err());
    }
}
