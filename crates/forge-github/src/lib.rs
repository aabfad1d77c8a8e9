//! GitHub capability operations and their agent tool wrappers.
mod client;
mod tools;

pub use client::{
    GithubApiClient, GithubClientConfig, GithubError, IssueRow, IssueState, PullRequestRow,
    RepoDetail, RepoRef, RepoSummary,
};
pub use tools::{
    register_github_tools, CreateIssueTool, CreatePullRequestTool, GetRepoTool, ListIssuesTool,
    ListReposTool,
};
