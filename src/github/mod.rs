pub mod event;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use tracing::{debug, instrument};

use crate::gateway::{ClientError, CommentPage, IssueComment, IssueComments, RemoteError, RepoRef};

const PER_PAGE: &str = "100";

/// Thin GitHub REST client for issue comments.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::MissingGithubToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("preview-deploy"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(
            Some(status.as_u16()),
            format!("{operation} failed: {}", github_error_message(&body)),
        ))
    }
}

fn github_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// True when an RFC 8288 `Link` header advertises a `rel="next"` page.
pub fn link_has_next(link: Option<&str>) -> bool {
    link.map(|value| {
        value
            .split(',')
            .any(|part| part.split(';').skip(1).any(|p| p.trim() == r#"rel="next""#))
    })
    .unwrap_or(false)
}

#[async_trait]
impl IssueComments for GithubClient {
    #[instrument(skip(self), fields(owner = %repo.owner, repo = %repo.name))]
    async fn list_comments(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        page: u32,
    ) -> Result<CommentPage, RemoteError> {
        let page = page.to_string();
        let request = self
            .http
            .get(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, repo.owner, repo.name, issue_number
            ))
            .query(&[("per_page", PER_PAGE), ("page", page.as_str())]);
        let response = self.send("list issue comments", request).await?;
        let has_next = link_has_next(response.headers().get(LINK).and_then(|v| v.to_str().ok()));
        let comments: Vec<IssueComment> = response.json().await?;
        debug!(count = comments.len(), has_next, "received comment page");
        Ok(CommentPage { comments, has_next })
    }

    #[instrument(skip(self, body), fields(owner = %repo.owner, repo = %repo.name))]
    async fn create_comment(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError> {
        let request = self
            .http
            .post(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, repo.owner, repo.name, issue_number
            ))
            .json(&json!({ "body": body }));
        Ok(self.send("create issue comment", request).await?.json().await?)
    }

    #[instrument(skip(self, body), fields(owner = %repo.owner, repo = %repo.name))]
    async fn update_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError> {
        let request = self
            .http
            .patch(format!(
                "{}/repos/{}/{}/issues/comments/{}",
                self.api_base, repo.owner, repo.name, comment_id
            ))
            .json(&json!({ "body": body }));
        Ok(self.send("update issue comment", request).await?.json().await?)
    }
}
