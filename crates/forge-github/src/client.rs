//! Reqwest client for the GitHub REST surface this service consumes.
//!
//! Failures are caught here, logged with the operation name and target,
//! and wrapped into a uniform error; nothing is retried.

use std::time::Duration;

use forge_auth::BearerToken;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT_VALUE: &str = "forge-coding-agent";
const PAGE_SIZE: usize = 100;
const EXCERPT_MAX_CHARS: usize = 240;

#[derive(Debug, Error)]
/// Errors surfaced by GitHub capability operations.
pub enum GithubError {
    #[error("github transport error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("github returned status {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid github response for {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
    #[error("invalid repository reference '{value}': expected owner/repo")]
    InvalidRepoRef { value: String },
    #[error("invalid github client configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parsed `owner/repo` reference.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, GithubError> {
        let mut parts = raw.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(GithubError::InvalidRepoRef {
                value: raw.to_string(),
            }),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Issue listing filter.
pub enum IssueState {
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Repository row returned by the listing operation.
pub struct RepoSummary {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    #[serde(rename(deserialize = "html_url"))]
    pub url: String,
    pub private: bool,
    pub language: Option<String>,
    #[serde(rename(deserialize = "stargazers_count"))]
    pub stars: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Repository detail returned by the get operation.
pub struct RepoDetail {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    #[serde(rename(deserialize = "html_url"))]
    pub url: String,
    pub private: bool,
    pub language: Option<String>,
    #[serde(rename(deserialize = "stargazers_count"))]
    pub stars: u64,
    #[serde(rename(deserialize = "forks_count"))]
    pub forks: u64,
    #[serde(rename(deserialize = "open_issues_count"))]
    pub open_issues: u64,
    pub default_branch: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueApiRow {
    number: u64,
    title: String,
    body: Option<String>,
    html_url: String,
    state: String,
    #[serde(default)]
    labels: Vec<IssueLabel>,
    created_at: String,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueLabel {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Issue row exposed to callers. Pull requests never appear here.
pub struct IssueRow {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub url: String,
    pub state: String,
    pub labels: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<IssueApiRow> for IssueRow {
    fn from(row: IssueApiRow) -> Self {
        Self {
            number: row.number,
            title: row.title,
            body: row.body,
            url: row.html_url,
            state: row.state,
            labels: row.labels.into_iter().map(|label| label.name).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PullRequestApiRow {
    number: u64,
    title: String,
    body: Option<String>,
    html_url: String,
    state: String,
    head: BranchRef,
    base: BranchRef,
    created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Pull request row exposed to callers.
pub struct PullRequestRow {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub url: String,
    pub state: String,
    pub head: String,
    pub base: String,
    pub created_at: String,
}

impl From<PullRequestApiRow> for PullRequestRow {
    fn from(row: PullRequestApiRow) -> Self {
        Self {
            number: row.number,
            title: row.title,
            body: row.body,
            url: row.html_url,
            state: row.state,
            head: row.head.branch,
            base: row.base.branch,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
/// Connection settings for the GitHub client.
pub struct GithubClientConfig {
    pub api_base: String,
    pub token: BearerToken,
    pub request_timeout_ms: u64,
}

impl GithubClientConfig {
    pub fn new(token: BearerToken) -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
/// Bearer-authenticated GitHub REST client.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubApiClient {
    pub fn new(config: GithubClientConfig) -> Result<Self, GithubError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT_VALUE),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static(GITHUB_API_VERSION),
        );
        let auth_header = format!("Bearer {}", config.token.expose().trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
                GithubError::InvalidConfig("token is not a valid header value".to_string())
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| GithubError::InvalidConfig(error.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Lists the authenticated user's repositories, most recently updated
    /// first, bounded by `limit`.
    pub async fn list_repos(&self, limit: usize) -> Result<Vec<RepoSummary>, GithubError> {
        let per_page = limit.clamp(1, PAGE_SIZE);
        let request = self
            .http
            .get(format!("{}/user/repos", self.api_base))
            .query(&[
                ("sort", "updated"),
                ("per_page", per_page.to_string().as_str()),
            ]);
        let mut rows: Vec<RepoSummary> = self.request_json("list repos", "user", request).await?;
        rows.truncate(limit);
        Ok(rows)
    }

    /// Fetches repository detail for an `owner/repo` reference.
    pub async fn get_repo(&self, full_name: &str) -> Result<RepoDetail, GithubError> {
        let repo = RepoRef::parse(full_name)?;
        let request = self.http.get(format!(
            "{}/repos/{}/{}",
            self.api_base, repo.owner, repo.name
        ));
        self.request_json("get repo", full_name, request).await
    }

    /// Lists issues for a repository, excluding pull requests (GitHub
    /// returns them as issue rows), bounded by `limit`.
    pub async fn list_issues(
        &self,
        full_name: &str,
        state: IssueState,
        limit: usize,
    ) -> Result<Vec<IssueRow>, GithubError> {
        let repo = RepoRef::parse(full_name)?;
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let request = self
                .http
                .get(format!(
                    "{}/repos/{}/{}/issues",
                    self.api_base, repo.owner, repo.name
                ))
                .query(&[
                    ("state", state.as_str()),
                    ("per_page", PAGE_SIZE.to_string().as_str()),
                    ("page", page_value.as_str()),
                ]);
            let chunk: Vec<IssueApiRow> =
                self.request_json("list issues", full_name, request).await?;
            let chunk_len = chunk.len();
            rows.extend(
                chunk
                    .into_iter()
                    .filter(|issue| issue.pull_request.is_none())
                    .map(IssueRow::from),
            );
            if rows.len() >= limit || chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        rows.truncate(limit);
        Ok(rows)
    }

    /// Creates an issue, optionally labeled.
    pub async fn create_issue(
        &self,
        full_name: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRow, GithubError> {
        let repo = RepoRef::parse(full_name)?;
        let payload = json!({
            "title": title,
            "body": body,
            "labels": labels,
        });
        let request = self
            .http
            .post(format!(
                "{}/repos/{}/{}/issues",
                self.api_base, repo.owner, repo.name
            ))
            .json(&payload);
        let row: IssueApiRow = self.request_json("create issue", full_name, request).await?;
        Ok(row.into())
    }

    /// Opens a pull request from `head` into `base`.
    pub async fn create_pull_request(
        &self,
        full_name: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestRow, GithubError> {
        let repo = RepoRef::parse(full_name)?;
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });
        let request = self
            .http
            .post(format!(
                "{}/repos/{}/{}/pulls",
                self.api_base, repo.owner, repo.name
            ))
            .json(&payload);
        let row: PullRequestApiRow = self
            .request_json("create pull request", full_name, request)
            .await?;
        Ok(row.into())
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        target: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GithubError> {
        let response = request.send().await.map_err(|source| {
            warn!(operation, resource = target, error = %source, "github request failed");
            GithubError::Transport { operation, source }
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| {
            warn!(operation, resource = target, error = %source, "github response read failed");
            GithubError::Transport { operation, source }
        })?;
        if !status.is_success() {
            warn!(operation, resource = target, status = status.as_u16(), "github returned error status");
            return Err(GithubError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_excerpt(&body),
            });
        }
        serde_json::from_str(&body).map_err(|error| GithubError::InvalidResponse {
            operation,
            message: error.to_string(),
        })
    }
}

fn truncate_excerpt(body: &str) -> String {
    if body.chars().count() <= EXCERPT_MAX_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(EXCERPT_MAX_CHARS).collect();
    format!("{truncated}…")
}
